//! Turns a chosen custom path into a custom scan plan.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::TypeId;
use crate::expr::TargetEntry;
use crate::planner::path::CustomPath;
use crate::planner::plan::{CustomScan, Plan, Scan};
use crate::planner::{PlannerInfo, RelOptInfo, RestrictInfo};
use crate::scan::methods::IX_SCAN_METHODS;
use crate::scan::path::AccessPathDescriptor;

const TARGET: &str = "ixscan::core::scan::compiler";

/// The kind of execution a compiled scan performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanKind {
	BitmapHeap,
}

/// The frozen payload of a compiled scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPrivate {
	pub kind: PlanKind,
	/// The type of the leading primary key column
	pub key_type: TypeId,
}

impl ScanPrivate {
	/// The access path this plan was compiled from
	pub fn path_kind(&self) -> AccessPathDescriptor {
		match self.kind {
			PlanKind::BitmapHeap => AccessPathDescriptor::BitmapHeapPath,
		}
	}
}

/// Skips pass-through result nodes
pub(crate) fn unwrap_result(plan: &Plan) -> &Plan {
	match plan {
		Plan::Result(result) => unwrap_result(&result.outer),
		other => other,
	}
}

/// Compiles a custom path of this provider and its planned nested path into a scan plan
pub fn plan_custom_path(
	root: &PlannerInfo,
	rel: &RelOptInfo,
	best_path: &CustomPath,
	_tlist: Vec<TargetEntry>,
	_clauses: Vec<RestrictInfo>,
	custom_plans: Vec<Plan>,
) -> Result<Plan> {
	let [subplan] = custom_plans.as_slice() else {
		fail!("A {} path carries {} nested plans instead of one", best_path.custom_private, custom_plans.len());
	};
	let (scan, kind) = match best_path.custom_private {
		AccessPathDescriptor::BitmapHeapPath => {
			let Plan::BitmapHeapScan(bitmap) = unwrap_result(subplan) else {
				fail!("Expected a bitmap heap scan below a bitmap heap path, found {}", subplan.node_name());
			};
			let scan = Scan {
				cost: bitmap.scan.cost,
				targetlist: bitmap.scan.targetlist.clone(),
				qual: bitmap.scan.qual.clone(),
				scanrelid: rel.relid,
			};
			(scan, PlanKind::BitmapHeap)
		}
	};
	let relation = root.open_relation(rel.relid)?;
	let Some(descr) = relation.descr() else {
		fail!("Relation {} is not index-organized", relation.name);
	};
	let primary = descr.primary();
	if primary.nfields() != 1 {
		fail!("Bitmap scans need exactly one leading primary key field, {} has {}", primary.name, primary.nfields());
	}
	let key_type = primary.fields[0].input_type;
	trace!(target: TARGET, relation = %relation.name, key_type = %key_type, "Compiled custom scan");
	Ok(Plan::CustomScan(CustomScan {
		scan,
		custom_plans,
		custom_private: ScanPrivate {
			kind,
			key_type,
		},
		methods: &IX_SCAN_METHODS,
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::planner::plan::{PlanCost, ResultPlan};

	fn seq_scan() -> Plan {
		Plan::SeqScan(Scan {
			cost: PlanCost::default(),
			targetlist: Vec::new(),
			qual: Vec::new(),
			scanrelid: 1,
		})
	}

	#[test]
	fn result_nodes_are_unwrapped() {
		let wrapped = Plan::Result(ResultPlan {
			cost: PlanCost::default(),
			targetlist: Vec::new(),
			outer: Box::new(Plan::Result(ResultPlan {
				cost: PlanCost::default(),
				targetlist: Vec::new(),
				outer: Box::new(seq_scan()),
			})),
		});
		assert!(matches!(unwrap_result(&wrapped), Plan::SeqScan(_)));
		let plain = seq_scan();
		assert!(matches!(unwrap_result(&plain), Plan::SeqScan(_)));
	}

	#[test]
	fn private_payload_names_its_path() {
		let payload = ScanPrivate {
			kind: PlanKind::BitmapHeap,
			key_type: TypeId::INT4,
		};
		assert_eq!(payload.path_kind(), AccessPathDescriptor::BitmapHeapPath);
	}
}
