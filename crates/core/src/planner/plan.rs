//! Finished plan nodes.

use std::fmt;

use anyhow::Result;

use crate::catalog::Oid;
use crate::expr::{Expr, TargetEntry};
use crate::scan::compiler::ScanPrivate;
use crate::scan::executor::CustomScanState;

/// The cost estimates of a plan node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanCost {
	pub startup_cost: f64,
	pub total_cost: f64,
	pub plan_rows: f64,
	pub plan_width: i32,
}

/// The part shared by all scan nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
	pub cost: PlanCost,
	pub targetlist: Vec<TargetEntry>,
	pub qual: Vec<Expr>,
	/// The range table index of the scanned relation
	pub scanrelid: usize,
}

#[derive(Debug, Clone)]
pub struct BitmapHeapScan {
	pub scan: Scan,
	/// The index conditions to recheck against fetched rows
	pub bitmapqualorig: Vec<Expr>,
	/// The plan producing the candidate bitmap
	pub bitmapqualplan: Box<Plan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmapIndexScan {
	pub cost: PlanCost,
	pub scanrelid: usize,
	pub indexid: Oid,
	pub indexqual: Vec<Expr>,
	pub indexqualorig: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct BitmapCombine {
	pub cost: PlanCost,
	pub bitmapplans: Vec<Plan>,
}

/// A pass-through node which only projects
#[derive(Debug, Clone)]
pub struct ResultPlan {
	pub cost: PlanCost,
	pub targetlist: Vec<TargetEntry>,
	pub outer: Box<Plan>,
}

/// Creates the runtime state of a custom scan node
pub type CreateCustomScanStateFn = fn(cscan: &CustomScan) -> Result<CustomScanState>;

/// The callbacks of a custom scan node, recognised by address
pub struct CustomScanMethods {
	pub name: &'static str,
	pub create_custom_scan_state: CreateCustomScanStateFn,
}

impl fmt::Debug for CustomScanMethods {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CustomScanMethods").field("name", &self.name).finish_non_exhaustive()
	}
}

/// A scan node whose execution is supplied by a provider
#[derive(Debug, Clone)]
pub struct CustomScan {
	pub scan: Scan,
	pub custom_plans: Vec<Plan>,
	pub custom_private: ScanPrivate,
	pub methods: &'static CustomScanMethods,
}

#[derive(Debug, Clone)]
pub enum Plan {
	SeqScan(Scan),
	BitmapHeapScan(BitmapHeapScan),
	BitmapIndexScan(BitmapIndexScan),
	BitmapAnd(BitmapCombine),
	BitmapOr(BitmapCombine),
	Result(ResultPlan),
	CustomScan(CustomScan),
}

impl Plan {
	/// The node name shown by explain
	pub fn node_name(&self) -> &'static str {
		match self {
			Self::SeqScan(_) => "Seq Scan",
			Self::BitmapHeapScan(_) => "Bitmap Heap Scan",
			Self::BitmapIndexScan(_) => "Bitmap Index Scan",
			Self::BitmapAnd(_) => "BitmapAnd",
			Self::BitmapOr(_) => "BitmapOr",
			Self::Result(_) => "Result",
			Self::CustomScan(_) => "Custom Scan",
		}
	}

	pub fn cost(&self) -> &PlanCost {
		match self {
			Self::SeqScan(s) => &s.cost,
			Self::BitmapHeapScan(s) => &s.scan.cost,
			Self::BitmapIndexScan(s) => &s.cost,
			Self::BitmapAnd(s) | Self::BitmapOr(s) => &s.cost,
			Self::Result(s) => &s.cost,
			Self::CustomScan(s) => &s.scan.cost,
		}
	}

	/// The relation scanned by this node, if it is a scan
	pub fn scanrelid(&self) -> Option<usize> {
		match self {
			Self::SeqScan(s) => Some(s.scanrelid),
			Self::BitmapHeapScan(s) => Some(s.scan.scanrelid),
			Self::CustomScan(s) => Some(s.scan.scanrelid),
			_ => None,
		}
	}
}
