//! Explain output of custom scans.
//!
//! The bitmap probe tree is rendered with the generic node renderer, but every node is reopened
//! after rendering so that index counters are written inside the node they belong to, and the
//! children of AND and OR nodes are nested by this walker rather than the generic one.

use anyhow::Result;

use crate::catalog::TableDescr;
use crate::cnf::INSTRUMENT_ALL_INDEXES;
use crate::exec::PlanState;
use crate::explain::{ExplainState, RenderOptions, explain_node, show_instrumentation_count, show_scan_qual};
use crate::planner::plan::Plan;
use crate::scan::counters::{CallCounters, InstrumentationCounters};
use crate::scan::executor::{CustomScanState, ScanPlanState};

/// Renders the provider-specific part of a custom scan node
pub fn explain_custom_scan(node: &CustomScanState, ancestors: &[&Plan], es: &mut ExplainState) -> Result<()> {
	let descr = node.relation().and_then(|r| r.descr()).cloned();
	match node.kind() {
		ScanPlanState::BitmapHeap(state) => {
			if es.is_text() {
				es.indent_text();
				es.append_text("Bitmap heap scan\n");
			} else {
				es.property_text("Custom Scan Subtype", "Bitmap Heap Scan");
			}
			show_scan_qual(&state.bitmapqualorig, "Recheck Cond", es);
			if !state.bitmapqualorig.is_empty() {
				show_instrumentation_count("Rows Removed by Index Recheck", 2, node.instrument(), es);
			}
			if let Some(plan_state) = state.plan_state.as_ref() {
				let Some(descr) = descr.as_deref() else {
					fail!("Cannot explain a bitmap scan without its table descriptor");
				};
				let walker = ProbeWalker {
					descr,
					counters: node.counters().map(|c| c.as_ref()),
				};
				es.open_group("Plans", Some("Plans"), false);
				walker.explain_probe(plan_state, ancestors, "Outer", es)?;
				es.close_group("Plans", false);
			}
		}
	}
	if let Some(counters) = node.counters() {
		render_counters("Scan", counters.scan(), es);
	}
	Ok(())
}

struct ProbeWalker<'a> {
	descr: &'a TableDescr,
	counters: Option<&'a InstrumentationCounters>,
}

impl ProbeWalker<'_> {
	fn explain_probe(
		&self,
		ps: &PlanState,
		ancestors: &[&Plan],
		relationship: &str,
		es: &mut ExplainState,
	) -> Result<()> {
		let saved = es.indent();
		match &ps.plan {
			Plan::BitmapAnd(_) | Plan::BitmapOr(_) => {
				let opts = RenderOptions {
					suppress_children: true,
				};
				explain_node(ps, ancestors, Some(relationship), es, opts)?;
				es.reopen_group()?;
				let mut next = ancestors.to_vec();
				next.push(&ps.plan);
				es.open_group("Plans", Some("Plans"), false);
				for child in &ps.children {
					self.explain_probe(child, &next, "Member", es)?;
				}
				es.close_group("Plans", false);
			}
			Plan::BitmapIndexScan(scan) => {
				explain_node(ps, ancestors, Some(relationship), es, RenderOptions::default())?;
				es.reopen_group()?;
				if let Some(counters) = self.counters {
					let Some(position) = self.descr.index_position(scan.indexid) else {
						fail!("Index {} is not an index of table {}", scan.indexid, self.descr.oid);
					};
					if let Some(index) = counters.index(position) {
						render_index_counters(&self.descr.indices()[position].name, index, es);
					}
				}
			}
			other => fail!("Can't explain node {} below a bitmap scan", other.node_name()),
		}
		es.close_group("Plan", true);
		es.set_indent(saved);
		Ok(())
	}
}

/// Renders the counters of one index, skipping indexes never called unless all are requested
fn render_index_counters(name: &str, counters: &CallCounters, es: &mut ExplainState) {
	if counters.calls() == 0 && !*INSTRUMENT_ALL_INDEXES {
		return;
	}
	render_counters(name, counters, es);
}

fn render_counters(name: &str, counters: &CallCounters, es: &mut ExplainState) {
	if es.is_text() {
		es.indent_text();
		es.append_text(&format!("{name}: calls={} rows={}\n", counters.calls(), counters.rows()));
	} else {
		es.property_integer(&format!("{name} Calls"), None, counters.calls() as i64);
		es.property_integer(&format!("{name} Rows"), None, counters.rows() as i64);
	}
}
