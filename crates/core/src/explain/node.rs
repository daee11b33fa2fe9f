//! The generic renderer of plan state trees.

use anyhow::Result;

use crate::exec::{Instrumentation, PlanState};
use crate::explain::ExplainState;
use crate::expr::{Expr, deparse_qual};
use crate::planner::plan::Plan;

/// Adjusts how [`explain_node`] renders a single node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
	/// Render the node as if it had no children
	pub suppress_children: bool,
}

/// Renders a whole plan state tree as one query
pub fn explain_plan(ps: &PlanState, es: &mut ExplainState) -> Result<()> {
	es.begin_output();
	es.open_group("Query", None, true);
	explain_node(ps, &[], None, es, RenderOptions::default())?;
	es.close_group("Query", true);
	es.end_output();
	Ok(())
}

/// Renders one node and, unless suppressed, its children.
///
/// The node's group is the last one closed when this returns, so callers can reopen it to
/// append further properties.
pub fn explain_node(
	ps: &PlanState,
	ancestors: &[&Plan],
	relationship: Option<&str>,
	es: &mut ExplainState,
	opts: RenderOptions,
) -> Result<()> {
	let plan = &ps.plan;
	let save_indent = es.indent();
	es.open_group(
		"Plan",
		match relationship {
			Some(_) => None,
			None => Some("Plan"),
		},
		true,
	);
	if es.is_text() {
		if es.indent() > 0 {
			es.indent_text();
			es.append_text("->  ");
			es.set_indent(es.indent() + 2);
		}
		es.append_text(plan.node_name());
		es.set_indent(es.indent() + 1);
		if let Plan::CustomScan(cscan) = plan {
			es.append_text(&format!(" ({})", cscan.methods.name));
		}
		explain_target(plan, es);
		if es.costs {
			let cost = plan.cost();
			es.append_text(&format!(
				"  (cost={:.2}..{:.2} rows={:.0} width={})",
				cost.startup_cost, cost.total_cost, cost.plan_rows, cost.plan_width
			));
		}
		if es.analyze {
			match ps.instrument() {
				Some(instr) if instr.loops > 0 => es.append_text(&format!(
					" (actual rows={:.0} loops={})",
					instr.rows_per_loop(),
					instr.loops
				)),
				_ => es.append_text(" (never executed)"),
			}
		}
		es.append_text("\n");
	} else {
		es.property_text("Node Type", plan.node_name());
		if let Some(relationship) = relationship {
			es.property_text("Parent Relationship", relationship);
		}
		if let Plan::CustomScan(cscan) = plan {
			es.property_text("Custom Plan Provider", cscan.methods.name);
		}
		es.property_bool("Parallel Aware", false);
		explain_target(plan, es);
		if es.costs {
			let cost = plan.cost();
			es.property_float("Startup Cost", None, cost.startup_cost, 2);
			es.property_float("Total Cost", None, cost.total_cost, 2);
			es.property_float("Plan Rows", None, cost.plan_rows, 0);
			es.property_integer("Plan Width", None, i64::from(cost.plan_width));
		}
		if es.analyze {
			let (rows, loops) = match ps.instrument() {
				Some(instr) if instr.loops > 0 => (instr.rows_per_loop(), instr.loops as f64),
				_ => (0.0, 0.0),
			};
			es.property_float("Actual Rows", None, rows, 0);
			es.property_float("Actual Loops", None, loops, 0);
		}
	}

	let mut next: Vec<&Plan> = ancestors.to_vec();
	next.push(plan);
	match plan {
		Plan::BitmapIndexScan(node) => {
			show_scan_qual(&node.indexqualorig, "Index Cond", es);
		}
		Plan::BitmapHeapScan(node) => {
			show_scan_qual(&node.bitmapqualorig, "Recheck Cond", es);
			if !node.bitmapqualorig.is_empty() {
				show_instrumentation_count("Rows Removed by Index Recheck", 2, ps.instrument(), es);
			}
			show_scan_qual(&node.scan.qual, "Filter", es);
			if !node.scan.qual.is_empty() {
				show_instrumentation_count("Rows Removed by Filter", 1, ps.instrument(), es);
			}
		}
		Plan::SeqScan(scan) => {
			show_scan_qual(&scan.qual, "Filter", es);
			if !scan.qual.is_empty() {
				show_instrumentation_count("Rows Removed by Filter", 1, ps.instrument(), es);
			}
		}
		Plan::CustomScan(cscan) => {
			show_scan_qual(&cscan.scan.qual, "Filter", es);
			if !cscan.scan.qual.is_empty() {
				show_instrumentation_count("Rows Removed by Filter", 1, ps.instrument(), es);
			}
			if let Some(custom) = ps.custom.as_deref() {
				if let Some(explain) = custom.methods.explain_custom_scan {
					explain(custom, &next, es)?;
				}
			}
		}
		Plan::BitmapAnd(_) | Plan::BitmapOr(_) | Plan::Result(_) => {}
	}

	if !opts.suppress_children && !ps.children.is_empty() {
		let relationship = match plan {
			Plan::Result(_) => "Outer",
			_ => "Member",
		};
		es.open_group("Plans", Some("Plans"), false);
		for child in &ps.children {
			explain_node(child, &next, Some(relationship), es, RenderOptions::default())?;
		}
		es.close_group("Plans", false);
	}

	es.close_group("Plan", true);
	// Text output restores its indentation after the close, so a reopened node keeps the
	// indentation of its body
	if es.is_text() {
		es.set_indent(save_indent);
	}
	Ok(())
}

/// Names the relation or index a node reads
fn explain_target(plan: &Plan, es: &mut ExplainState) {
	match plan {
		Plan::BitmapIndexScan(node) => {
			let name = es.index_name(node.indexid).unwrap_or_else(|| node.indexid.to_string());
			if es.is_text() {
				es.append_text(&format!(" on {name}"));
			} else {
				es.property_text("Index Name", &name);
			}
		}
		other => {
			let Some(scanrelid) = other.scanrelid() else {
				return;
			};
			let name = es.relation_name(scanrelid).unwrap_or_else(|| format!("${scanrelid}"));
			let alias = es.relation_alias(scanrelid).unwrap_or_else(|| name.clone());
			if es.is_text() {
				es.append_text(&format!(" on {name}"));
				if alias != name {
					es.append_text(&format!(" {alias}"));
				}
			} else {
				es.property_text("Relation Name", &name);
				es.property_text("Alias", &alias);
			}
		}
	}
}

/// Renders an implicitly AND-ed qual list under a label, if it is not empty
pub fn show_scan_qual(quals: &[Expr], label: &str, es: &mut ExplainState) {
	if let Some(text) = deparse_qual(quals, &|v| es.column_name(v)) {
		es.property_text(label, &text);
	}
}

/// Renders the rows a node removed through one of its filters, averaged over its loops
pub fn show_instrumentation_count(
	label: &str,
	which: u8,
	instr: Option<&Instrumentation>,
	es: &mut ExplainState,
) {
	if !es.analyze {
		return;
	}
	let Some(instr) = instr else {
		return;
	};
	let nfiltered = match which {
		1 => instr.nfiltered1,
		_ => instr.nfiltered2,
	};
	if nfiltered > 0 || !es.is_text() {
		let value = match instr.loops {
			0 => 0.0,
			_ => instr.filtered_per_loop(which),
		};
		es.property_float(label, None, value, 0);
	}
}
