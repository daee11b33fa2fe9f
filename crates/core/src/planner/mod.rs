//! The optimizer surface the scan provider operates on.
//!
//! Candidate paths are produced by the host's cost model. This module only carries them, together
//! with the per-relation index metadata and restriction clauses, and hosts the hook points the
//! provider registers at.

pub mod allpaths;
pub mod createplan;
pub mod path;
pub mod plan;

use std::sync::Arc;

use anyhow::Result;

use crate::catalog::{IndexDescr, Oid, RelKind, Relation, RelationCatalog, TupleDesc};
use crate::expr::{Expr, TargetEntry, Var};
use crate::planner::path::Path;

/// The kind of a range table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RteKind {
	Relation,
	Subquery,
	Function,
	Values,
}

/// An entry of the query's range table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTblEntry {
	pub rtekind: RteKind,
	pub relid: Oid,
	pub relkind: RelKind,
	pub alias: Option<String>,
}

impl RangeTblEntry {
	/// A range table entry scanning a relation
	pub fn relation(relation: &Relation) -> Self {
		Self {
			rtekind: RteKind::Relation,
			relid: relation.oid,
			relkind: relation.relkind,
			alias: None,
		}
	}
}

/// Planner state for one query
pub struct PlannerInfo {
	/// The range table, addressed by 1-based index
	pub rtable: Vec<RangeTblEntry>,
	pub catalog: Arc<dyn RelationCatalog>,
}

impl PlannerInfo {
	pub fn new(rtable: Vec<RangeTblEntry>, catalog: Arc<dyn RelationCatalog>) -> Self {
		Self {
			rtable,
			catalog,
		}
	}

	/// Returns the range table entry at a 1-based index
	pub fn rte(&self, rti: usize) -> Result<&RangeTblEntry> {
		match rti.checked_sub(1).and_then(|i| self.rtable.get(i)) {
			Some(rte) => Ok(rte),
			None => fail!("Range table index {rti} is out of bounds"),
		}
	}

	/// Opens the relation scanned by a range table entry
	pub fn open_relation(&self, rti: usize) -> Result<Arc<Relation>> {
		let relid = self.rte(rti)?.relid;
		match self.catalog.relation(relid) {
			Some(relation) => Ok(relation),
			None => fail!("Relation {relid} is missing from the catalog"),
		}
	}
}

/// A restriction clause of a base relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictInfo {
	pub clause: Expr,
}

impl RestrictInfo {
	pub fn new(clause: Expr) -> Self {
		Self {
			clause,
		}
	}
}

/// Index metadata as seen by the optimizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptInfo {
	pub indexoid: Oid,
	/// The range table index of the indexed relation
	pub rel: usize,
	/// The number of columns, including non-key returnable columns
	pub ncolumns: usize,
	/// The number of key columns, which are the only ones clauses match against
	pub nkeycolumns: usize,
	/// The 1-based attribute number of each column
	pub indexkeys: Vec<usize>,
	/// Whether each column can be returned by an index-only scan
	pub canreturn: Vec<bool>,
	/// The expressions an index-only scan returns
	pub indextlist: Vec<TargetEntry>,
	/// The predicate of a partial index
	pub indpred: Vec<Expr>,
	/// Whether the partial index predicate was proven by the query
	pub pred_ok: bool,
}

impl IndexOptInfo {
	/// Describes an index of the relation at range table index `rel`
	pub fn new(rel: usize, index: &IndexDescr, tupdesc: &TupleDesc) -> Self {
		let mut indexkeys = Vec::with_capacity(index.nfields());
		let mut indextlist = Vec::with_capacity(index.nfields());
		for field in &index.fields {
			indexkeys.push(field.attnum + 1);
			let (typmod, collation) = tupdesc
				.attr(field.attnum)
				.map(|a| (a.typmod, a.collation))
				.unwrap_or((-1, Oid::INVALID));
			let var = Expr::Var(Var {
				varno: rel,
				varattno: field.attnum + 1,
				vartype: field.input_type,
				vartypmod: typmod,
				varcollid: collation,
			});
			indextlist.push(TargetEntry::new(var, indextlist.len() + 1, None));
		}
		Self {
			indexoid: index.oid,
			rel,
			ncolumns: index.nfields(),
			nkeycolumns: index.nfields(),
			canreturn: vec![true; index.nfields()],
			indexkeys,
			indextlist,
			indpred: Vec::new(),
			pred_ok: false,
		}
	}

	/// Whether the index can be used by this query at all
	pub fn is_usable(&self) -> bool {
		self.indpred.is_empty() || self.pred_ok
	}
}

/// The restriction clauses that matched each key column of an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexClauseSet {
	pub nonempty: bool,
	/// Positions into the relation's restriction list, per key column
	pub indexclauses: Vec<Vec<usize>>,
}

/// Matches the relation's restriction clauses against the key columns of an index
pub fn match_restriction_clauses_to_index(rel: &RelOptInfo, index: &IndexOptInfo) -> IndexClauseSet {
	let mut set = IndexClauseSet {
		nonempty: false,
		indexclauses: vec![Vec::new(); index.nkeycolumns],
	};
	for (pos, rinfo) in rel.baserestrictinfo.iter().enumerate() {
		let Some((var, _, _)) = rinfo.clause.as_var_op_const() else {
			continue;
		};
		if var.varno != rel.relid {
			continue;
		}
		for (col, key) in index.indexkeys.iter().take(index.nkeycolumns).enumerate() {
			if *key == var.varattno {
				set.indexclauses[col].push(pos);
				set.nonempty = true;
			}
		}
	}
	set
}

/// Per-relation planner state
#[derive(Debug, Clone)]
pub struct RelOptInfo {
	/// The range table index of the relation
	pub relid: usize,
	/// The estimated number of tuples in the relation
	pub tuples: f64,
	/// The estimated number of pages of the relation
	pub pages: f64,
	/// The estimated number of output rows
	pub rows: f64,
	pub consider_parallel: bool,
	pub pathlist: Vec<Path>,
	pub partial_pathlist: Vec<Path>,
	pub indexlist: Vec<IndexOptInfo>,
	pub baserestrictinfo: Vec<RestrictInfo>,
}

impl RelOptInfo {
	pub fn new(relid: usize) -> Self {
		Self {
			relid,
			tuples: 0.0,
			pages: 0.0,
			rows: 0.0,
			consider_parallel: false,
			pathlist: Vec::new(),
			partial_pathlist: Vec::new(),
			indexlist: Vec::new(),
			baserestrictinfo: Vec::new(),
		}
	}

	/// Builds the optimizer's view of a relation and its indexes
	pub fn for_relation(relid: usize, relation: &Relation) -> Self {
		let mut rel = Self::new(relid);
		if let Some(descr) = relation.descr() {
			// A synthesized row identifier is not an index the optimizer can use
			let skip = usize::from(!descr.has_primary());
			rel.indexlist = descr
				.indices()
				.iter()
				.skip(skip)
				.map(|index| IndexOptInfo::new(relid, index, &relation.tupdesc))
				.collect();
		}
		rel
	}

	pub fn add_path(&mut self, path: Path) {
		self.pathlist.push(path);
	}

	pub fn add_partial_path(&mut self, path: Path) {
		self.partial_pathlist.push(path);
	}

	/// Returns the path with the lowest total cost
	pub fn cheapest_total_path(&self) -> Option<&Path> {
		self.pathlist.iter().min_by(|a, b| a.info().total_cost.total_cmp(&b.info().total_cost))
	}

	pub fn index(&self, oid: Oid) -> Option<&IndexOptInfo> {
		self.indexlist.iter().find(|i| i.indexoid == oid)
	}
}
