//! Turns chosen paths into plan nodes.

use anyhow::Result;

use crate::catalog::TypeId;
use crate::expr::{Expr, TargetEntry};
use crate::planner::path::{BitmapHeapPath, BitmapQual, Path, PathInfo};
use crate::planner::plan::{BitmapCombine, BitmapHeapScan, BitmapIndexScan, Plan, PlanCost, Scan};
use crate::planner::{PlannerInfo, RelOptInfo};

/// Estimates the average output width of a target list
pub fn estimate_width(tlist: &[TargetEntry]) -> i32 {
	tlist
		.iter()
		.map(|te| match &te.expr {
			Expr::Var(v) => match v.vartype {
				TypeId::BOOL => 1,
				TypeId::INT2 => 2,
				TypeId::INT4 | TypeId::OID => 4,
				TypeId::INT8 => 8,
				TypeId::TID => 6,
				_ => 32,
			},
			_ => 4,
		})
		.sum()
}

fn cost_of(info: &PathInfo, width: i32) -> PlanCost {
	PlanCost {
		startup_cost: info.startup_cost,
		total_cost: info.total_cost,
		plan_rows: info.rows,
		plan_width: width,
	}
}

/// Creates the plan of a chosen path
pub fn create_scan_plan(
	root: &PlannerInfo,
	rel: &RelOptInfo,
	path: &Path,
	tlist: Vec<TargetEntry>,
) -> Result<Plan> {
	let clauses: Vec<Expr> = rel.baserestrictinfo.iter().map(|r| r.clause.clone()).collect();
	match path {
		Path::SeqScan(info) => Ok(Plan::SeqScan(Scan {
			cost: cost_of(info, estimate_width(&tlist)),
			targetlist: tlist,
			qual: clauses,
			scanrelid: rel.relid,
		})),
		Path::BitmapHeap(path) => Ok(create_bitmap_scan_plan(rel, path, tlist, clauses)),
		Path::Custom(path) => {
			let custom_plans = path
				.custom_paths
				.iter()
				.map(|p| create_scan_plan(root, rel, p, tlist.clone()))
				.collect::<Result<Vec<_>>>()?;
			(path.methods.plan_custom_path)(
				root,
				rel,
				path,
				tlist,
				rel.baserestrictinfo.clone(),
				custom_plans,
			)
		}
		other => fail!("Planning of {} paths is not available here", other.kind_name()),
	}
}

fn create_bitmap_scan_plan(
	rel: &RelOptInfo,
	path: &BitmapHeapPath,
	tlist: Vec<TargetEntry>,
	clauses: Vec<Expr>,
) -> Plan {
	let (bitmapqualplan, bitmapqualorig) = create_bitmap_subplan(rel, &path.bitmapqual);
	// Clauses enforced by the index conditions are rechecked, not filtered again
	let qual = clauses.into_iter().filter(|c| !bitmapqualorig.contains(c)).collect();
	Plan::BitmapHeapScan(BitmapHeapScan {
		scan: Scan {
			cost: cost_of(&path.info, estimate_width(&tlist)),
			targetlist: tlist,
			qual,
			scanrelid: rel.relid,
		},
		bitmapqualorig,
		bitmapqualplan: Box::new(bitmapqualplan),
	})
}

/// Returns the plan gathering candidates for a bitmap qual, and the conditions it implies
fn create_bitmap_subplan(rel: &RelOptInfo, qual: &BitmapQual) -> (Plan, Vec<Expr>) {
	match qual {
		BitmapQual::Index(path) => {
			let plan = Plan::BitmapIndexScan(BitmapIndexScan {
				cost: cost_of(&path.info, 0),
				scanrelid: rel.relid,
				indexid: path.indexoid,
				indexqual: path.indexclauses.clone(),
				indexqualorig: path.indexclauses.clone(),
			});
			(plan, path.indexclauses.clone())
		}
		BitmapQual::And(items) => {
			let mut plans = Vec::with_capacity(items.len());
			let mut quals = Vec::new();
			for item in items {
				let (plan, sub) = create_bitmap_subplan(rel, item);
				plans.push(plan);
				for q in sub {
					if !quals.contains(&q) {
						quals.push(q);
					}
				}
			}
			(Plan::BitmapAnd(combine(plans)), quals)
		}
		BitmapQual::Or(items) => {
			let mut plans = Vec::with_capacity(items.len());
			let mut arms = Vec::with_capacity(items.len());
			for item in items {
				let (plan, mut sub) = create_bitmap_subplan(rel, item);
				plans.push(plan);
				arms.push(match sub.len() {
					1 => sub.remove(0),
					_ => Expr::and(sub),
				});
			}
			(Plan::BitmapOr(combine(plans)), vec![Expr::or(arms)])
		}
	}
}

fn combine(plans: Vec<Plan>) -> BitmapCombine {
	let total_cost = plans.iter().map(|p| p.cost().total_cost).sum();
	BitmapCombine {
		cost: PlanCost {
			startup_cost: total_cost,
			total_cost,
			plan_rows: 0.0,
			plan_width: 0,
		},
		bitmapplans: plans,
	}
}
