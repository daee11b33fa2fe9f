//! The interface of index-organized storage engines.

pub mod bitmap;
pub mod mem;

use std::sync::Arc;

use anyhow::Result;

pub use self::bitmap::KeyBitmap;
use crate::catalog::{Relation, TypeId};
use crate::exec::{ExecutionContext, PlanState, ScanArena};
use crate::expr::Row;
use crate::scan::counters::InstrumentationCounters;
use crate::txn::Snapshot;

/// Everything a storage engine needs to start a bitmap scan
pub struct BitmapScanArgs<'a> {
	/// The opened bitmap sub-plan yielding candidate keys
	pub plan_state: &'a mut PlanState,
	pub relation: &'a Relation,
	/// The type of the leading primary key column
	pub key_type: TypeId,
	pub snapshot: Arc<Snapshot>,
	/// The arena the cursor accounts its memory to
	pub arena: Arc<ScanArena>,
	/// Per-index counters, when the scan is instrumented
	pub counters: Option<Arc<InstrumentationCounters>>,
	pub ctx: &'a ExecutionContext,
}

/// A storage engine organizing tables by their primary key
pub trait StorageEngine: Send + Sync {
	fn name(&self) -> &str;

	/// Gathers the candidate keys of the bitmap sub-plan and returns a cursor over the rows
	/// visible to the snapshot. The cursor is released by dropping it.
	fn make_bitmap_scan(&self, args: BitmapScanArgs<'_>) -> Result<Box<dyn BitmapScan>>;
}

/// A cursor over the rows of a bitmap scan
pub trait BitmapScan: Send {
	/// Returns the next visible row, or `None` once the candidates are exhausted
	fn fetch_next(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>>;
}
