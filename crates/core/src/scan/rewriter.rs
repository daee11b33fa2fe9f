//! Path generation hooks for index-organized tables.
//!
//! Before plain paths are generated, every index lacking a primary key column is extended to
//! return it, so index-only plans stay available. Once all paths exist, bitmap heap paths are
//! replaced by custom paths and sample scans are rejected.

use std::sync::Arc;

use anyhow::Result;

use crate::catalog::{Oid, RelKind, Relation};
use crate::err::Error;
use crate::expr::{Expr, TargetEntry, Var};
use crate::planner::allpaths::{SetPlainRelPathlistHook, SetRelPathlistHook};
use crate::planner::path::Path;
use crate::planner::{PlannerInfo, RangeTblEntry, RelOptInfo, RteKind, match_restriction_clauses_to_index};
use crate::scan::path::transform_path;

const TARGET: &str = "ixscan::core::scan::rewriter";

/// Opens the relation of a range table entry if this provider handles it
fn index_organized_relation(root: &PlannerInfo, rte: &RangeTblEntry) -> Option<Arc<Relation>> {
	if rte.rtekind != RteKind::Relation || !matches!(rte.relkind, RelKind::Table | RelKind::MatView) {
		return None;
	}
	root.catalog.relation(rte.relid).filter(|r| r.is_index_organized())
}

/// Extends every index of the relation to return all primary key columns.
///
/// Returns whether a plain full-relation path is still needed.
pub fn augment_index_targets(rel: &mut RelOptInfo, relation: &Relation) -> bool {
	let Some(descr) = relation.descr() else {
		return true;
	};
	if !descr.has_primary() {
		return true;
	}
	for index in rel.indexlist.iter_mut() {
		for field in &descr.primary().fields {
			let attno = field.attnum + 1;
			if index.indexkeys.contains(&attno) {
				continue;
			}
			let (typmod, collation) = relation
				.tupdesc
				.attr(field.attnum)
				.map(|a| (a.typmod, a.collation))
				.unwrap_or((-1, Oid::INVALID));
			index.ncolumns += 1;
			index.indexkeys.push(attno);
			index.canreturn.push(true);
			let var = Expr::Var(Var {
				varno: index.rel,
				varattno: attno,
				vartype: field.input_type,
				vartypmod: typmod,
				varcollid: collation,
			});
			index.indextlist.push(TargetEntry::new(var, index.ncolumns, None));
			trace!(target: TARGET, index = %index.indexoid, attno, "Added primary key column to index");
		}
	}
	plain_scan_needed(rel)
}

/// A plain path is needed unless some usable index matches a restriction clause
pub fn plain_scan_needed(rel: &RelOptInfo) -> bool {
	if rel.baserestrictinfo.is_empty() {
		return true;
	}
	!rel.indexlist
		.iter()
		.filter(|index| index.is_usable())
		.any(|index| match_restriction_clauses_to_index(rel, index).nonempty)
}

/// Replaces bitmap heap paths with custom paths and rejects sample scans
pub fn rewrite_pathlist(rel: &mut RelOptInfo, relation: &Relation) -> Result<()> {
	let pathlist = rel
		.pathlist
		.iter()
		.cloned()
		.map(|path| -> Result<Path> {
			match path {
				Path::SampleScan(_) => Err(Error::tablesample_not_supported(&relation.name).into()),
				Path::BitmapHeap(path) => Ok(Path::Custom(transform_path(path))),
				other => Ok(other),
			}
		})
		.collect::<Result<Vec<_>>>()?;
	rel.pathlist = pathlist;
	// Only plain scans run in parallel over this storage kind
	rel.partial_pathlist.retain(|path| matches!(path, Path::SeqScan(_) | Path::SampleScan(_)));
	debug!(
		target: TARGET,
		relation = %relation.name,
		paths = rel.pathlist.len(),
		partial_paths = rel.partial_pathlist.len(),
		"Rewrote relation paths"
	);
	Ok(())
}

/// Augments the indexes of index-organized tables before plain paths are generated
#[derive(Debug, Default)]
pub struct IxPlainRelPathlistHook;

impl SetPlainRelPathlistHook for IxPlainRelPathlistHook {
	#[instrument(level = "trace", target = "ixscan::core::scan::rewriter", skip_all)]
	fn set_plain_rel_pathlist(
		&self,
		root: &PlannerInfo,
		rel: &mut RelOptInfo,
		rte: &RangeTblEntry,
	) -> Result<bool> {
		match index_organized_relation(root, rte) {
			Some(relation) => Ok(augment_index_targets(rel, &relation)),
			None => Ok(true),
		}
	}
}

/// Rewrites the paths of index-organized tables, then runs the previously installed hook
pub struct IxRelPathlistHook {
	prev: Option<Arc<dyn SetRelPathlistHook>>,
}

impl IxRelPathlistHook {
	pub fn new(prev: Option<Arc<dyn SetRelPathlistHook>>) -> Self {
		Self {
			prev,
		}
	}
}

impl SetRelPathlistHook for IxRelPathlistHook {
	#[instrument(level = "trace", target = "ixscan::core::scan::rewriter", skip_all)]
	fn set_rel_pathlist(
		&self,
		root: &PlannerInfo,
		rel: &mut RelOptInfo,
		rti: usize,
		rte: &RangeTblEntry,
	) -> Result<()> {
		if let Some(relation) = index_organized_relation(root, rte) {
			rewrite_pathlist(rel, &relation)?;
		}
		if let Some(prev) = &self.prev {
			prev.set_rel_pathlist(root, rel, rti, rte)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::{Attribute, TypeId};
	use crate::expr::CmpOp;
	use crate::planner::RestrictInfo;
	use crate::planner::path::PathInfo;
	use crate::storage::mem::{IndexDef, MemEngine, TableDef};

	fn orders() -> Arc<Relation> {
		MemEngine::new()
			.create_table(TableDef {
				oid: Oid(100),
				name: "orders".to_owned(),
				relkind: RelKind::Table,
				columns: vec![
					Attribute::new("id", TypeId::INT4),
					Attribute::new("status", TypeId::TEXT),
					Attribute::new("amount", TypeId::INT8),
				],
				primary_key: Some(IndexDef::new(101, "orders_pkey", &[0])),
				indexes: vec![IndexDef::new(102, "orders_status", &[1])],
			})
			.unwrap()
	}

	fn restrict(rel: &mut RelOptInfo, attno: usize, value: &str) {
		rel.baserestrictinfo.push(RestrictInfo::new(Expr::op(
			CmpOp::Eq,
			Expr::var(1, attno, TypeId::TEXT),
			Expr::constant(value, TypeId::TEXT),
		)));
	}

	#[test]
	fn verdict_needs_a_matching_usable_index() {
		let relation = orders();
		let mut rel = RelOptInfo::for_relation(1, &relation);
		assert!(augment_index_targets(&mut rel, &relation));
		restrict(&mut rel, 3, "10");
		assert!(plain_scan_needed(&rel));
		restrict(&mut rel, 2, "x");
		assert!(!plain_scan_needed(&rel));
		// An unproven partial index does not count
		for index in rel.indexlist.iter_mut() {
			index.indpred = vec![Expr::constant(true, TypeId::BOOL)];
		}
		assert!(plain_scan_needed(&rel));
	}

	#[test]
	fn sample_scan_is_rejected_without_substitution() {
		let relation = orders();
		let mut rel = RelOptInfo::for_relation(1, &relation);
		rel.add_path(Path::SampleScan(PathInfo::new(1, 10.0, 0.0, 5.0)));
		let before = rel.pathlist.len();
		let err = rewrite_pathlist(&mut rel, &relation).unwrap_err();
		let Some(Error::FeatureNotSupported {
			table,
			..
		}) = err.downcast_ref::<Error>()
		else {
			panic!("expected a feature not supported error, got {err:?}");
		};
		assert_eq!(table, "orders");
		assert_eq!(rel.pathlist.len(), before);
		assert!(rel.pathlist.iter().all(|p| !matches!(p, Path::Custom(_))));
	}
}
