//! Path generation for base relations and the hooks providers register into it.

use std::sync::Arc;

use anyhow::Result;

use crate::planner::path::{Path, PathInfo};
use crate::planner::{PlannerInfo, RangeTblEntry, RelOptInfo};

const TARGET: &str = "ixscan::core::planner::allpaths";

/// The cost of processing one tuple
pub const CPU_TUPLE_COST: f64 = 0.01;
/// The cost of evaluating one operator
pub const CPU_OPERATOR_COST: f64 = 0.0025;
/// The cost of reading one page sequentially
pub const SEQ_PAGE_COST: f64 = 1.0;

/// Runs before the plain paths of a relation are generated.
///
/// Returns whether a plain full-relation path should be generated.
pub trait SetPlainRelPathlistHook: Send + Sync {
	fn set_plain_rel_pathlist(
		&self,
		root: &PlannerInfo,
		rel: &mut RelOptInfo,
		rte: &RangeTblEntry,
	) -> Result<bool>;
}

/// Runs once every path of a relation has been generated
pub trait SetRelPathlistHook: Send + Sync {
	fn set_rel_pathlist(
		&self,
		root: &PlannerInfo,
		rel: &mut RelOptInfo,
		rti: usize,
		rte: &RangeTblEntry,
	) -> Result<()>;
}

/// The hooks installed into path generation
#[derive(Clone, Default)]
pub struct PlannerHooks {
	pub set_plain_rel_pathlist: Option<Arc<dyn SetPlainRelPathlistHook>>,
	pub set_rel_pathlist: Option<Arc<dyn SetRelPathlistHook>>,
}

impl PlannerHooks {
	/// Installs a relation pathlist hook, handing it the previously installed one
	pub fn install_rel_pathlist<F>(&mut self, install: F)
	where
		F: FnOnce(Option<Arc<dyn SetRelPathlistHook>>) -> Arc<dyn SetRelPathlistHook>,
	{
		let prev = self.set_rel_pathlist.take();
		self.set_rel_pathlist = Some(install(prev));
	}
}

/// Estimates a sequential scan over the relation
pub fn cost_seqscan(rel: &RelOptInfo) -> PathInfo {
	let per_tuple = CPU_TUPLE_COST + CPU_OPERATOR_COST * rel.baserestrictinfo.len() as f64;
	let total = SEQ_PAGE_COST * rel.pages + per_tuple * rel.tuples;
	PathInfo::new(rel.relid, rel.rows, 0.0, total)
}

/// Builds the path list of a base relation.
///
/// `candidates` are the index and bitmap paths the cost model produced for the relation.
pub fn set_base_rel_pathlist(
	root: &PlannerInfo,
	rel: &mut RelOptInfo,
	rti: usize,
	hooks: &PlannerHooks,
	candidates: Vec<Path>,
) -> Result<()> {
	let rte = root.rte(rti)?.clone();
	let plain = match &hooks.set_plain_rel_pathlist {
		Some(hook) => hook.set_plain_rel_pathlist(root, rel, &rte)?,
		None => true,
	};
	if plain {
		rel.add_path(Path::SeqScan(cost_seqscan(rel)));
		if rel.consider_parallel {
			let mut info = cost_seqscan(rel);
			info.parallel_aware = true;
			info.parallel_workers = 2;
			rel.add_partial_path(Path::SeqScan(info));
		}
	} else {
		trace!(target: TARGET, rti, "Skipping the plain scan path");
	}
	for path in candidates {
		rel.add_path(path);
	}
	if let Some(hook) = &hooks.set_rel_pathlist {
		hook.set_rel_pathlist(root, rel, rti, &rte)?;
	}
	Ok(())
}
