//! The runtime state machine of a custom scan.
//!
//! A scan moves from `Created` to `Opened` when it begins, to `Fetching` once its cursor is
//! built by the first fetch, back to `Opened` on a rescan, and to `Ended` when it ends. The
//! snapshot is captured once when the scan opens and is kept across rescans. Everything the scan
//! allocates at runtime is accounted to a [`ScanArena`] which is released when the scan ends.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::catalog::{Relation, TypeId};
use crate::err::Error;
use crate::exec::node::CustomExecMethods;
use crate::exec::{
	ExecFlags, ExecutionContext, Instrumentation, PlanState, Projection, ScanArena, end_node, init_node,
	rescan_node,
};
use crate::expr::{Expr, Row, exec_qual};
use crate::planner::plan::{CustomScan, Plan};
use crate::scan::compiler::{PlanKind, unwrap_result};
use crate::scan::counters::InstrumentationCounters;
use crate::scan::methods::IX_EXEC_METHODS;
use crate::storage::{BitmapScan, BitmapScanArgs};
use crate::txn::Snapshot;

const TARGET: &str = "ixscan::core::scan";

/// The lifecycle position of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
	Created,
	Opened,
	Fetching,
	Ended,
}

/// The runtime state of a bitmap heap scan
pub struct BitmapHeapState {
	pub key_type: TypeId,
	/// The plan gathering candidate keys
	pub bitmapqualplan: Plan,
	/// The index conditions rechecked against every fetched row
	pub bitmapqualorig: Vec<Expr>,
	/// The opened candidate plan, present between open and end
	pub plan_state: Option<PlanState>,
	cursor: Option<Box<dyn BitmapScan>>,
}

impl BitmapHeapState {
	pub fn has_cursor(&self) -> bool {
		self.cursor.is_some()
	}
}

/// The kind-specific runtime state of a scan
pub enum ScanPlanState {
	BitmapHeap(BitmapHeapState),
}

/// The runtime state of one custom scan instantiation
pub struct CustomScanState {
	pub methods: &'static CustomExecMethods,
	pub plan: CustomScan,
	relation: Option<Arc<Relation>>,
	projection: Projection,
	qual: Vec<Expr>,
	instrument: Option<Instrumentation>,
	status: ScanStatus,
	kind: ScanPlanState,
	snapshot: Option<Arc<Snapshot>>,
	arena: Option<Arc<ScanArena>>,
	counters: Option<Arc<InstrumentationCounters>>,
	rows_returned: u64,
}

impl CustomScanState {
	/// Binds the scanned relation and the node's instrumentation before the scan begins
	pub fn attach_relation(&mut self, relation: Arc<Relation>, instrument: Option<Instrumentation>) {
		self.relation = Some(relation);
		self.instrument = instrument;
	}

	pub fn relation(&self) -> Option<&Arc<Relation>> {
		self.relation.as_ref()
	}

	pub fn instrument(&self) -> Option<&Instrumentation> {
		self.instrument.as_ref()
	}

	pub fn instrument_mut(&mut self) -> Option<&mut Instrumentation> {
		self.instrument.as_mut()
	}

	pub fn status(&self) -> ScanStatus {
		self.status
	}

	pub fn kind(&self) -> &ScanPlanState {
		&self.kind
	}

	pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
		self.snapshot.as_ref()
	}

	pub fn arena(&self) -> Option<&Arc<ScanArena>> {
		self.arena.as_ref()
	}

	/// The counters of an instrumented scan
	pub fn counters(&self) -> Option<&Arc<InstrumentationCounters>> {
		self.counters.as_ref()
	}

	pub fn rows_returned(&self) -> u64 {
		self.rows_returned
	}

	fn relation_name(&self) -> &str {
		self.relation.as_deref().map(|r| r.name.as_str()).unwrap_or("<unbound>")
	}
}

impl fmt::Debug for CustomScanState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CustomScanState")
			.field("relation", &self.relation_name())
			.field("status", &self.status)
			.field("rows_returned", &self.rows_returned)
			.finish_non_exhaustive()
	}
}

impl Drop for CustomScanState {
	fn drop(&mut self) {
		if !matches!(self.status, ScanStatus::Opened | ScanStatus::Fetching) {
			return;
		}
		warn!(target: TARGET, relation = %self.relation_name(), "Scan was dropped without being ended");
		match &mut self.kind {
			ScanPlanState::BitmapHeap(state) => {
				state.cursor = None;
				state.plan_state = None;
			}
		}
		self.counters = None;
		self.arena = None;
		self.status = ScanStatus::Ended;
	}
}

/// Creates the runtime state of a compiled scan
pub fn create_custom_scan_state(cscan: &CustomScan) -> Result<CustomScanState> {
	let [subplan] = cscan.custom_plans.as_slice() else {
		fail!("A custom scan carries {} nested plans instead of one", cscan.custom_plans.len());
	};
	let kind = match cscan.custom_private.kind {
		PlanKind::BitmapHeap => {
			let Plan::BitmapHeapScan(bitmap) = unwrap_result(subplan) else {
				fail!("Expected a bitmap heap scan below a custom scan, found {}", subplan.node_name());
			};
			ScanPlanState::BitmapHeap(BitmapHeapState {
				key_type: cscan.custom_private.key_type,
				bitmapqualplan: (*bitmap.bitmapqualplan).clone(),
				bitmapqualorig: bitmap.bitmapqualorig.clone(),
				plan_state: None,
				cursor: None,
			})
		}
	};
	Ok(CustomScanState {
		methods: &IX_EXEC_METHODS,
		plan: cscan.clone(),
		relation: None,
		projection: Projection::new(cscan.scan.targetlist.clone()),
		qual: cscan.scan.qual.clone(),
		instrument: None,
		status: ScanStatus::Created,
		kind,
		snapshot: None,
		arena: None,
		counters: None,
		rows_returned: 0,
	})
}

/// Opens the scan: captures the snapshot, creates the arena and counters, opens the sub-plan
#[instrument(level = "trace", target = "ixscan::core::scan", skip_all)]
pub fn begin(node: &mut CustomScanState, ctx: &ExecutionContext, flags: ExecFlags) -> Result<()> {
	if node.status != ScanStatus::Created {
		fail!("Scan of {} was opened twice", node.relation_name());
	}
	let Some(relation) = node.relation.clone() else {
		fail!("Scan was opened without a relation");
	};
	let Some(descr) = relation.descr() else {
		fail!("Relation {} is not index-organized", relation.name);
	};
	let arena = ScanArena::new(ctx.query_arena(), &format!("scan {}", relation.name));
	if ctx.is_analyze() {
		let counters = InstrumentationCounters::new(descr.num_indices());
		arena.charge(counters.memory_size())?;
		node.counters = Some(Arc::new(counters));
	}
	node.arena = Some(arena);
	node.snapshot = Some(ctx.snapshot());
	match &mut node.kind {
		ScanPlanState::BitmapHeap(state) => {
			state.plan_state = Some(init_node(&state.bitmapqualplan, ctx, flags)?);
		}
	}
	node.status = ScanStatus::Opened;
	trace!(target: TARGET, relation = %relation.name, instrumented = node.counters.is_some(), "Opened scan");
	Ok(())
}

/// Returns the next row of the scan, or `None` once it is exhausted
pub fn exec(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<Option<Row>> {
	if !matches!(node.status, ScanStatus::Opened | ScanStatus::Fetching) {
		return Err(Error::ScanNotOpen.into());
	}
	let _counters = ctx.counters().install(node.counters.as_ref().map(|c| c.scan().clone()));
	match &mut node.kind {
		ScanPlanState::BitmapHeap(state) => {
			if state.cursor.is_none() {
				let (Some(relation), Some(snapshot), Some(arena)) =
					(node.relation.as_deref(), node.snapshot.clone(), node.arena.clone())
				else {
					fail!("Scan is open without its relation, snapshot or arena");
				};
				let Some(plan_state) = state.plan_state.as_mut() else {
					fail!("Scan of {} is open without its bitmap plan", relation.name);
				};
				let Some(io) = relation.index_organized.as_ref() else {
					fail!("Relation {} is not index-organized", relation.name);
				};
				let cursor = io.storage.make_bitmap_scan(BitmapScanArgs {
					plan_state,
					relation,
					key_type: state.key_type,
					snapshot,
					arena,
					counters: node.counters.clone(),
					ctx,
				})?;
				state.cursor = Some(cursor);
				node.status = ScanStatus::Fetching;
			}
			let Some(cursor) = state.cursor.as_mut() else {
				fail!("Scan cursor vanished while fetching");
			};
			while let Some(row) = cursor.fetch_next(ctx)? {
				if !state.bitmapqualorig.is_empty() && !exec_qual(&state.bitmapqualorig, &row) {
					if let Some(instr) = node.instrument.as_mut() {
						instr.nfiltered2 += 1;
					}
					continue;
				}
				if !node.qual.is_empty() && !exec_qual(&node.qual, &row) {
					if let Some(instr) = node.instrument.as_mut() {
						instr.nfiltered1 += 1;
					}
					continue;
				}
				node.rows_returned += 1;
				return Ok(Some(node.projection.project(Some(&row))));
			}
			Ok(None)
		}
	}
}

/// Restarts the scan from its first row under the same snapshot
#[instrument(level = "trace", target = "ixscan::core::scan", skip_all)]
pub fn rescan(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<()> {
	if !matches!(node.status, ScanStatus::Opened | ScanStatus::Fetching) {
		return Err(Error::ScanNotOpen.into());
	}
	match &mut node.kind {
		ScanPlanState::BitmapHeap(state) => {
			state.cursor = None;
			if let Some(plan_state) = state.plan_state.as_mut() {
				rescan_node(plan_state, ctx)?;
			}
		}
	}
	if let Some(counters) = &node.counters {
		counters.reset();
	}
	node.status = ScanStatus::Opened;
	Ok(())
}

/// Ends the scan, releasing its cursor, sub-plan, counters and arena
#[instrument(level = "trace", target = "ixscan::core::scan", skip_all)]
pub fn end(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<()> {
	if node.status == ScanStatus::Ended {
		return Ok(());
	}
	let result = match &mut node.kind {
		ScanPlanState::BitmapHeap(state) => {
			state.cursor = None;
			match state.plan_state.take() {
				Some(mut plan_state) => end_node(&mut plan_state, ctx),
				None => Ok(()),
			}
		}
	};
	if let Some(instr) = node.instrument.as_mut() {
		instr.end_loop();
	}
	node.counters = None;
	node.arena = None;
	ctx.counters().clear();
	node.status = ScanStatus::Ended;
	debug!(target: TARGET, relation = %node.relation_name(), rows = node.rows_returned, "Scan completed");
	result
}
