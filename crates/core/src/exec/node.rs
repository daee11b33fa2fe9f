//! Runtime state of plan trees and the dispatch of the executor protocol.

use std::fmt;

use anyhow::Result;

use crate::exec::{ExecFlags, ExecutionContext, Instrumentation};
use crate::explain::ExplainState;
use crate::expr::Row;
use crate::planner::plan::Plan;
use crate::scan::executor::CustomScanState;

pub type BeginCustomScanFn =
	fn(node: &mut CustomScanState, ctx: &ExecutionContext, flags: ExecFlags) -> Result<()>;
pub type ExecCustomScanFn =
	fn(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<Option<Row>>;
pub type EndCustomScanFn = fn(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<()>;
pub type RescanCustomScanFn = fn(node: &mut CustomScanState, ctx: &ExecutionContext) -> Result<()>;
pub type ExplainCustomScanFn =
	fn(node: &CustomScanState, ancestors: &[&Plan], es: &mut ExplainState) -> Result<()>;

/// The execution callbacks of a custom scan node, recognised by address
pub struct CustomExecMethods {
	pub name: &'static str,
	pub begin_custom_scan: BeginCustomScanFn,
	pub exec_custom_scan: ExecCustomScanFn,
	pub end_custom_scan: EndCustomScanFn,
	pub rescan_custom_scan: RescanCustomScanFn,
	pub explain_custom_scan: Option<ExplainCustomScanFn>,
}

impl fmt::Debug for CustomExecMethods {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CustomExecMethods").field("name", &self.name).finish_non_exhaustive()
	}
}

/// The runtime state of one plan node
pub struct PlanState {
	pub plan: Plan,
	pub instrument: Option<Instrumentation>,
	pub children: Vec<PlanState>,
	/// Set for custom scan nodes, which keep their own instrumentation
	pub custom: Option<Box<CustomScanState>>,
}

impl PlanState {
	fn new(plan: &Plan, ctx: &ExecutionContext) -> Self {
		Self {
			plan: plan.clone(),
			instrument: ctx.is_analyze().then(Instrumentation::default),
			children: Vec::new(),
			custom: None,
		}
	}

	/// The statistics collected for this node
	pub fn instrument(&self) -> Option<&Instrumentation> {
		match &self.custom {
			Some(custom) => custom.instrument(),
			None => self.instrument.as_ref(),
		}
	}
}

impl fmt::Debug for PlanState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PlanState")
			.field("node", &self.plan.node_name())
			.field("instrument", &self.instrument())
			.field("children", &self.children)
			.finish()
	}
}

/// Initialises the runtime state of a plan tree
pub fn init_node(plan: &Plan, ctx: &ExecutionContext, flags: ExecFlags) -> Result<PlanState> {
	let mut state = PlanState::new(plan, ctx);
	match plan {
		Plan::BitmapAnd(node) | Plan::BitmapOr(node) => {
			state.children = node
				.bitmapplans
				.iter()
				.map(|p| init_node(p, ctx, flags))
				.collect::<Result<Vec<_>>>()?;
		}
		Plan::BitmapIndexScan(_) => {}
		Plan::Result(node) => {
			state.children = vec![init_node(&node.outer, ctx, flags)?];
		}
		Plan::CustomScan(cscan) => {
			let mut custom = (cscan.methods.create_custom_scan_state)(cscan)?;
			let relation = ctx.open_scan_relation(cscan.scan.scanrelid)?;
			custom.attach_relation(relation, state.instrument.take());
			(custom.methods.begin_custom_scan)(&mut custom, ctx, flags)?;
			state.custom = Some(Box::new(custom));
		}
		other => fail!("Execution of {} nodes is not available here", other.node_name()),
	}
	Ok(state)
}

/// Pulls the next row from a row-producing node
pub fn exec_proc_node(state: &mut PlanState, ctx: &ExecutionContext) -> Result<Option<Row>> {
	let Some(custom) = state.custom.as_deref_mut() else {
		fail!("{} nodes do not produce rows", state.plan.node_name());
	};
	if let Some(instr) = custom.instrument_mut() {
		instr.start_loop();
	}
	let row = (custom.methods.exec_custom_scan)(custom, ctx)?;
	if let (Some(instr), Some(_)) = (custom.instrument_mut(), row.as_ref()) {
		instr.count(1);
	}
	Ok(row)
}

/// Restarts a node so its output is produced again from the beginning
pub fn rescan_node(state: &mut PlanState, ctx: &ExecutionContext) -> Result<()> {
	if let Some(custom) = state.custom.as_deref_mut() {
		if let Some(instr) = custom.instrument_mut() {
			instr.end_loop();
		}
		return (custom.methods.rescan_custom_scan)(custom, ctx);
	}
	if let Some(instr) = state.instrument.as_mut() {
		instr.end_loop();
	}
	for child in state.children.iter_mut() {
		rescan_node(child, ctx)?;
	}
	Ok(())
}

/// Shuts a plan tree down, releasing its resources
pub fn end_node(state: &mut PlanState, ctx: &ExecutionContext) -> Result<()> {
	if let Some(custom) = state.custom.as_deref_mut() {
		return (custom.methods.end_custom_scan)(custom, ctx);
	}
	if let Some(instr) = state.instrument.as_mut() {
		instr.end_loop();
	}
	for child in state.children.iter_mut() {
		end_node(child, ctx)?;
	}
	Ok(())
}
