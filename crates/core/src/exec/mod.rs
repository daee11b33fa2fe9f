//! Executor services shared by every plan node.

pub mod arena;
pub mod instrument;
pub mod node;
pub mod project;

use std::sync::Arc;

use anyhow::Result;

pub use self::arena::{QueryArena, ScanArena};
pub use self::instrument::Instrumentation;
pub use self::node::{PlanState, end_node, exec_proc_node, init_node, rescan_node};
pub use self::project::Projection;
use crate::catalog::{Relation, RelationCatalog};
use crate::planner::RangeTblEntry;
use crate::scan::counters::CountersSlot;
use crate::txn::{Snapshot, SnapshotSource};

/// Flags passed when a plan tree is initialised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecFlags {
	/// The plan is only initialised to be explained
	pub explain_only: bool,
	/// The node may be rescanned
	pub rewind: bool,
	pub backward: bool,
}

/// The context one query executes in
pub struct ExecutionContext {
	catalog: Arc<dyn RelationCatalog>,
	range_table: Vec<RangeTblEntry>,
	snapshots: Arc<dyn SnapshotSource>,
	arena: Arc<QueryArena>,
	analyze: bool,
	counters: CountersSlot,
}

impl ExecutionContext {
	pub fn new(
		catalog: Arc<dyn RelationCatalog>,
		range_table: Vec<RangeTblEntry>,
		snapshots: Arc<dyn SnapshotSource>,
	) -> Self {
		Self {
			catalog,
			range_table,
			snapshots,
			arena: QueryArena::new("query"),
			analyze: false,
			counters: CountersSlot::default(),
		}
	}

	/// Runs the query under explain analyze instrumentation
	pub fn with_analyze(mut self, analyze: bool) -> Self {
		self.analyze = analyze;
		self
	}

	pub fn is_analyze(&self) -> bool {
		self.analyze
	}

	/// The snapshot a scan opened now should use
	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.snapshots.current_snapshot()
	}

	pub fn query_arena(&self) -> &Arc<QueryArena> {
		&self.arena
	}

	/// The slot holding the counters work is currently attributed to
	pub fn counters(&self) -> &CountersSlot {
		&self.counters
	}

	pub fn catalog(&self) -> &Arc<dyn RelationCatalog> {
		&self.catalog
	}

	pub fn range_table(&self) -> &[RangeTblEntry] {
		&self.range_table
	}

	/// Opens the relation at a 1-based range table index
	pub fn open_scan_relation(&self, scanrelid: usize) -> Result<Arc<Relation>> {
		let Some(rte) = scanrelid.checked_sub(1).and_then(|i| self.range_table.get(i)) else {
			fail!("Range table index {scanrelid} is out of bounds");
		};
		match self.catalog.relation(rte.relid) {
			Some(relation) => Ok(relation),
			None => fail!("Relation {} is missing from the catalog", rte.relid),
		}
	}
}
