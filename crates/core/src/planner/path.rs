//! Access paths as produced by the optimizer.

use std::fmt;

use anyhow::Result;

use crate::catalog::Oid;
use crate::expr::{Expr, TargetEntry};
use crate::planner::plan::Plan;
use crate::planner::{PlannerInfo, RelOptInfo, RestrictInfo};
use crate::scan::path::AccessPathDescriptor;

/// The outer relations a parameterized path depends on
#[derive(Debug, Clone, PartialEq)]
pub struct ParamPathInfo {
	pub required_outer: Vec<usize>,
	pub rows: f64,
}

/// A sort key a path's output is ordered by
#[derive(Debug, Clone, PartialEq)]
pub struct PathKey {
	pub expr: Expr,
	pub descending: bool,
}

/// The estimates and properties shared by every kind of path
#[derive(Debug, Clone, PartialEq)]
pub struct PathInfo {
	/// The range table index of the relation the path scans
	pub parent: usize,
	/// The expressions the path emits
	pub pathtarget: Vec<Expr>,
	pub param_info: Option<ParamPathInfo>,
	pub rows: f64,
	pub startup_cost: f64,
	pub total_cost: f64,
	pub pathkeys: Vec<PathKey>,
	pub parallel_aware: bool,
	pub parallel_safe: bool,
	pub parallel_workers: usize,
}

impl PathInfo {
	pub fn new(parent: usize, rows: f64, startup_cost: f64, total_cost: f64) -> Self {
		Self {
			parent,
			pathtarget: Vec::new(),
			param_info: None,
			rows,
			startup_cost,
			total_cost,
			pathkeys: Vec::new(),
			parallel_aware: false,
			parallel_safe: true,
			parallel_workers: 0,
		}
	}
}

/// A scan over a single index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPath {
	pub info: PathInfo,
	pub indexoid: Oid,
	pub indexclauses: Vec<Expr>,
	pub index_only: bool,
}

/// The candidate-gathering part of a bitmap heap path
#[derive(Debug, Clone, PartialEq)]
pub enum BitmapQual {
	Index(IndexPath),
	And(Vec<BitmapQual>),
	Or(Vec<BitmapQual>),
}

/// A bitmap heap scan: gather candidates from indexes, then fetch and recheck them
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapHeapPath {
	pub info: PathInfo,
	pub bitmapqual: BitmapQual,
}

/// Plans a custom path once the optimizer has chosen it
pub type PlanCustomPathFn = fn(
	root: &PlannerInfo,
	rel: &RelOptInfo,
	best_path: &CustomPath,
	tlist: Vec<TargetEntry>,
	clauses: Vec<RestrictInfo>,
	custom_plans: Vec<Plan>,
) -> Result<Plan>;

/// The callbacks of a custom path provider, recognised by address
pub struct CustomPathMethods {
	pub name: &'static str,
	pub plan_custom_path: PlanCustomPathFn,
}

impl fmt::Debug for CustomPathMethods {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CustomPathMethods").field("name", &self.name).finish_non_exhaustive()
	}
}

/// A path whose plan is supplied by a provider
#[derive(Debug, Clone)]
pub struct CustomPath {
	pub info: PathInfo,
	/// The paths this one is built from, planned before the custom path itself
	pub custom_paths: Vec<Path>,
	pub custom_private: AccessPathDescriptor,
	pub methods: &'static CustomPathMethods,
}

#[derive(Debug, Clone)]
pub enum Path {
	SeqScan(PathInfo),
	SampleScan(PathInfo),
	Index(IndexPath),
	BitmapHeap(BitmapHeapPath),
	Custom(CustomPath),
}

impl Path {
	pub fn info(&self) -> &PathInfo {
		match self {
			Self::SeqScan(info) | Self::SampleScan(info) => info,
			Self::Index(p) => &p.info,
			Self::BitmapHeap(p) => &p.info,
			Self::Custom(p) => &p.info,
		}
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			Self::SeqScan(_) => "SeqScan",
			Self::SampleScan(_) => "SampleScan",
			Self::Index(_) => "IndexPath",
			Self::BitmapHeap(_) => "BitmapHeapPath",
			Self::Custom(_) => "CustomPath",
		}
	}
}
