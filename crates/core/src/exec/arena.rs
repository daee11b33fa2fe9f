//! Accounting arenas scoped to a query and to a single scan.
//!
//! A [`ScanArena`] is always created as a child of a [`QueryArena`] and holds a strong reference
//! to it, so the parent outlives every child by construction. Dropping the scan arena returns
//! everything it accounted for to the parent in one step.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use crate::cnf::SCAN_ARENA_LIMIT;
use crate::err::Error;
use crate::mem::{MemoryReporter, register_memory_reporter};

const TARGET: &str = "ixscan::core::exec::arena";

/// The arena of one query execution
#[derive(Debug)]
pub struct QueryArena {
	name: String,
	/// Bytes accounted by all live child arenas
	allocated: AtomicUsize,
	/// The number of child arenas which have not been released
	live_children: AtomicUsize,
}

impl QueryArena {
	pub fn new(name: &str) -> Arc<Self> {
		let arena = Arc::new(Self {
			name: name.to_owned(),
			allocated: AtomicUsize::new(0),
			live_children: AtomicUsize::new(0),
		});
		let reporter: Arc<dyn MemoryReporter> = arena.clone();
		register_memory_reporter(&arena.name, Arc::downgrade(&reporter));
		arena
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The bytes currently accounted by child arenas
	pub fn allocated(&self) -> usize {
		self.allocated.load(Ordering::Acquire)
	}

	/// The number of child arenas which are still alive
	pub fn live_children(&self) -> usize {
		self.live_children.load(Ordering::Acquire)
	}
}

impl MemoryReporter for QueryArena {
	fn memory_allocated(&self) -> usize {
		self.allocated()
	}
}

/// The arena of one scan, released as a whole when dropped
#[derive(Debug)]
pub struct ScanArena {
	name: String,
	parent: Arc<QueryArena>,
	allocated: AtomicUsize,
	limit: usize,
}

impl ScanArena {
	/// Creates a child arena of the query arena, limited by `IXSCAN_SCAN_ARENA_LIMIT`
	pub fn new(parent: &Arc<QueryArena>, name: &str) -> Arc<Self> {
		Self::with_limit(parent, name, *SCAN_ARENA_LIMIT)
	}

	/// Creates a child arena with an explicit limit, where 0 means unlimited
	pub fn with_limit(parent: &Arc<QueryArena>, name: &str, limit: usize) -> Arc<Self> {
		parent.live_children.fetch_add(1, Ordering::AcqRel);
		let arena = Arc::new(Self {
			name: name.to_owned(),
			parent: parent.clone(),
			allocated: AtomicUsize::new(0),
			limit,
		});
		let reporter: Arc<dyn MemoryReporter> = arena.clone();
		register_memory_reporter(&arena.name, Arc::downgrade(&reporter));
		trace!(target: TARGET, arena = %arena.name, parent = %parent.name, "Created scan arena");
		arena
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn allocated(&self) -> usize {
		self.allocated.load(Ordering::Acquire)
	}

	/// Accounts `bytes` to this arena and its parent
	pub fn charge(&self, bytes: usize) -> Result<()> {
		let current = self.allocated.load(Ordering::Acquire);
		if self.limit > 0 && current.saturating_add(bytes) > self.limit {
			return Err(Error::OutOfMemory {
				context: self.name.clone(),
				requested: bytes,
				limit: self.limit,
			}
			.into());
		}
		self.allocated.fetch_add(bytes, Ordering::AcqRel);
		self.parent.allocated.fetch_add(bytes, Ordering::AcqRel);
		Ok(())
	}

	/// Returns up to `bytes` previously charged to this arena
	pub fn discharge(&self, bytes: usize) {
		let previous = self
			.allocated
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(bytes)))
			.unwrap_or_else(|v| v);
		self.parent.allocated.fetch_sub(previous.min(bytes), Ordering::AcqRel);
	}
}

impl MemoryReporter for ScanArena {
	fn memory_allocated(&self) -> usize {
		self.allocated()
	}
}

impl Drop for ScanArena {
	fn drop(&mut self) {
		let remaining = self.allocated.swap(0, Ordering::AcqRel);
		self.parent.allocated.fetch_sub(remaining, Ordering::AcqRel);
		self.parent.live_children.fetch_sub(1, Ordering::AcqRel);
		trace!(target: TARGET, arena = %self.name, released = remaining, "Released scan arena");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dropping_the_child_releases_everything() {
		let query = QueryArena::new("arena test query");
		let scan = ScanArena::with_limit(&query, "arena test scan", 0);
		scan.charge(128).unwrap();
		scan.charge(64).unwrap();
		scan.discharge(32);
		assert_eq!(scan.allocated(), 160);
		assert_eq!(query.allocated(), 160);
		assert_eq!(query.live_children(), 1);
		drop(scan);
		assert_eq!(query.allocated(), 0);
		assert_eq!(query.live_children(), 0);
	}

	#[test]
	fn discharge_never_underflows() {
		let query = QueryArena::new("arena test query");
		let scan = ScanArena::with_limit(&query, "arena test scan", 0);
		scan.charge(10).unwrap();
		scan.discharge(100);
		assert_eq!(scan.allocated(), 0);
		assert_eq!(query.allocated(), 0);
	}

	#[test]
	fn limit_is_enforced() {
		let query = QueryArena::new("arena test query");
		let scan = ScanArena::with_limit(&query, "arena test scan", 100);
		scan.charge(60).unwrap();
		let err = scan.charge(60).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<Error>(),
			Some(Error::OutOfMemory {
				requested: 60,
				limit: 100,
				..
			})
		));
		assert_eq!(query.allocated(), 60);
	}
}
