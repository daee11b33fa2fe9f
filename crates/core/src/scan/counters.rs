//! Call and row counters attributed to the indexes a scan probes.
//!
//! Work is attributed through the [`CountersSlot`] of the execution context rather than through
//! a global. The scan installs its scan-level counters for the length of each fetch and clears
//! the slot when it ends; storage code narrows the slot to one index with a [`CountersScope`],
//! which restores the previous counters when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// The calls made against one index and the rows they produced
#[derive(Debug, Default)]
pub struct CallCounters {
	calls: AtomicU64,
	rows: AtomicU64,
}

impl CallCounters {
	pub fn record_call(&self, rows: u64) {
		self.calls.fetch_add(1, Ordering::Relaxed);
		self.rows.fetch_add(rows, Ordering::Relaxed);
	}

	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	pub fn rows(&self) -> u64 {
		self.rows.load(Ordering::Relaxed)
	}

	pub fn reset(&self) {
		self.calls.store(0, Ordering::Relaxed);
		self.rows.store(0, Ordering::Relaxed);
	}

	pub fn is_zero(&self) -> bool {
		self.calls() == 0 && self.rows() == 0
	}
}

/// The counters of one instrumented scan: one set per index of the table, in the order of the
/// table descriptor, plus one set for the scan itself.
#[derive(Debug)]
pub struct InstrumentationCounters {
	scan: Arc<CallCounters>,
	indices: Vec<Arc<CallCounters>>,
}

impl InstrumentationCounters {
	pub fn new(num_indices: usize) -> Self {
		Self {
			scan: Arc::default(),
			indices: (0..num_indices).map(|_| Arc::default()).collect(),
		}
	}

	/// The counters of primary key fetches made by the scan
	pub fn scan(&self) -> &Arc<CallCounters> {
		&self.scan
	}

	/// The counters of the index at an ordinal position
	pub fn index(&self, position: usize) -> Option<&Arc<CallCounters>> {
		self.indices.get(position)
	}

	pub fn len(&self) -> usize {
		self.indices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	pub fn reset(&self) {
		self.scan.reset();
		self.indices.iter().for_each(|c| c.reset());
	}

	pub fn all_zero(&self) -> bool {
		self.scan.is_zero() && self.indices.iter().all(|c| c.is_zero())
	}

	/// The bytes these counters account for in a scan arena
	pub fn memory_size(&self) -> usize {
		std::mem::size_of::<Self>() + (self.indices.len() + 1) * std::mem::size_of::<CallCounters>()
	}
}

/// The counters which work is currently attributed to
#[derive(Debug, Default)]
pub struct CountersSlot {
	current: Mutex<Option<Arc<CallCounters>>>,
}

impl CountersSlot {
	pub fn clear(&self) {
		self.current.lock().take();
	}

	pub fn current(&self) -> Option<Arc<CallCounters>> {
		self.current.lock().clone()
	}

	pub fn is_empty(&self) -> bool {
		self.current.lock().is_none()
	}

	/// Records one call producing `rows` rows against the current counters, if any
	pub fn record_call(&self, rows: u64) {
		if let Some(counters) = self.current.lock().as_ref() {
			counters.record_call(rows);
		}
	}

	/// Attributes work to `counters` until the returned scope is dropped
	pub fn scoped(&self, counters: Arc<CallCounters>) -> CountersScope<'_> {
		self.install(Some(counters))
	}

	/// Replaces the current counters, `None` included, until the returned scope is dropped
	pub fn install(&self, counters: Option<Arc<CallCounters>>) -> CountersScope<'_> {
		let previous = std::mem::replace(&mut *self.current.lock(), counters);
		CountersScope {
			slot: self,
			previous,
		}
	}
}

/// Restores the previously attributed counters when dropped
#[must_use]
pub struct CountersScope<'a> {
	slot: &'a CountersSlot,
	previous: Option<Arc<CallCounters>>,
}

impl Drop for CountersScope<'_> {
	fn drop(&mut self) {
		*self.slot.current.lock() = self.previous.take();
	}
}
