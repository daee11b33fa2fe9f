#![allow(dead_code)]
//! Shared fixture for the integration tests: an `orders` table in the in-memory engine, a
//! planner run through the registered provider, and a helper draining a plan's rows.

use std::sync::Arc;

use anyhow::Result;
use ixscan_core::catalog::{Attribute, Catalog, Oid, RelKind, Relation, TypeId};
use ixscan_core::exec::{
	ExecFlags, ExecutionContext, PlanState, end_node, exec_proc_node, init_node,
};
use ixscan_core::expr::{CmpOp, Datum, Expr, Row, TargetEntry};
use ixscan_core::planner::allpaths::{PlannerHooks, set_base_rel_pathlist};
use ixscan_core::planner::createplan::create_scan_plan;
use ixscan_core::planner::path::{BitmapHeapPath, BitmapQual, IndexPath, Path, PathInfo};
use ixscan_core::planner::plan::Plan;
use ixscan_core::planner::{PlannerInfo, RangeTblEntry, RelOptInfo, RestrictInfo};
use ixscan_core::scan;
use ixscan_core::storage::mem::{IndexDef, MemEngine, TableDef};

pub const ORDERS: Oid = Oid(100);
pub const ORDERS_PKEY: Oid = Oid(101);
pub const ORDERS_STATUS: Oid = Oid(102);
pub const ORDERS_CUSTOMER: Oid = Oid(103);

/// The number of rows the fixture is seeded with
pub const SEEDED: i64 = 20;

pub struct Fixture {
	pub engine: Arc<MemEngine>,
	pub catalog: Arc<Catalog>,
	pub relation: Arc<Relation>,
	pub rtable: Vec<RangeTblEntry>,
}

impl Fixture {
	/// An `orders (id int4 primary key, status text, customer int4, amount int8)` table with
	/// indexes on `status` and `customer`, seeded with ids 1 to 20.
	///
	/// Every third order is `open`, the customer is the id modulo 5, and the amount is the id
	/// times 100.
	pub fn orders() -> Self {
		let engine = MemEngine::new();
		let relation = engine
			.create_table(TableDef {
				oid: ORDERS,
				name: "orders".to_owned(),
				relkind: RelKind::Table,
				columns: vec![
					Attribute::new("id", TypeId::INT4),
					Attribute::new("status", TypeId::TEXT),
					Attribute::new("customer", TypeId::INT4),
					Attribute::new("amount", TypeId::INT8),
				],
				primary_key: Some(IndexDef::new(101, "orders_pkey", &[0])),
				indexes: vec![
					IndexDef::new(102, "orders_status", &[1]),
					IndexDef::new(103, "orders_customer", &[2]),
				],
			})
			.unwrap();
		let fixture = Self::with_relation(engine, relation);
		for id in 1..=SEEDED {
			fixture.insert(id);
		}
		fixture
	}

	/// Registers an already created relation as the only range table entry
	pub fn with_relation(engine: Arc<MemEngine>, relation: Arc<Relation>) -> Self {
		let catalog = Arc::new(Catalog::new());
		catalog.register(relation.clone());
		let rtable = vec![RangeTblEntry::relation(&relation)];
		Self {
			engine,
			catalog,
			relation,
			rtable,
		}
	}

	/// Inserts the order with the given id, deriving its other columns from it
	pub fn insert(&self, id: i64) {
		let status = if id % 3 == 0 {
			"open"
		} else {
			"closed"
		};
		let row = vec![Datum::Int(id), Datum::from(status), Datum::Int(id % 5), Datum::Int(id * 100)];
		self.engine.insert(ORDERS, row).unwrap();
	}

	pub fn delete(&self, id: i64) {
		assert!(self.engine.delete(ORDERS, &[Datum::Int(id)]).unwrap());
	}

	pub fn planner(&self) -> PlannerInfo {
		PlannerInfo::new(self.rtable.clone(), self.catalog.clone())
	}

	/// The optimizer's view of the table, with the given restriction clauses
	pub fn rel(&self, restrictions: Vec<Expr>) -> RelOptInfo {
		let mut rel = RelOptInfo::for_relation(1, &self.relation);
		rel.pages = 100.0;
		rel.tuples = 1000.0;
		rel.rows = 10.0;
		rel.baserestrictinfo = restrictions.into_iter().map(RestrictInfo::new).collect();
		rel
	}

	/// Plans a scan of the table through the provider, offering one bitmap heap path
	pub fn plan(&self, bitmapqual: BitmapQual, restrictions: Vec<Expr>) -> Result<Plan> {
		let root = self.planner();
		let mut hooks = PlannerHooks::default();
		scan::register(&mut hooks);
		let mut rel = self.rel(restrictions);
		set_base_rel_pathlist(&root, &mut rel, 1, &hooks, vec![bitmap_heap_path(bitmapqual)])?;
		let Some(path) = rel.cheapest_total_path().cloned() else {
			anyhow::bail!("No path was generated");
		};
		create_scan_plan(&root, &rel, &path, self.tlist())
	}

	/// Every column of the table, in order
	pub fn tlist(&self) -> Vec<TargetEntry> {
		self.relation
			.tupdesc
			.attrs
			.iter()
			.enumerate()
			.map(|(n, a)| TargetEntry::new(Expr::var(1, n + 1, a.type_id), n + 1, Some(a.name.clone())))
			.collect()
	}

	pub fn context(&self, analyze: bool) -> ExecutionContext {
		ExecutionContext::new(self.catalog.clone(), self.rtable.clone(), self.engine.clone())
			.with_analyze(analyze)
	}

	/// Opens, drains and ends a plan, returning its rows
	pub fn run(&self, plan: &Plan, analyze: bool) -> Result<Vec<Row>> {
		let ctx = self.context(analyze);
		let mut state = init_node(plan, &ctx, ExecFlags::default())?;
		let rows = drain(&mut state, &ctx)?;
		end_node(&mut state, &ctx)?;
		Ok(rows)
	}
}

/// Pulls rows until the node is exhausted
pub fn drain(state: &mut PlanState, ctx: &ExecutionContext) -> Result<Vec<Row>> {
	let mut rows = Vec::new();
	while let Some(row) = exec_proc_node(state, ctx)? {
		rows.push(row);
	}
	Ok(rows)
}

/// Pulls at most `n` rows
pub fn take(state: &mut PlanState, ctx: &ExecutionContext, n: usize) -> Result<Vec<Row>> {
	let mut rows = Vec::with_capacity(n);
	while rows.len() < n {
		match exec_proc_node(state, ctx)? {
			Some(row) => rows.push(row),
			None => break,
		}
	}
	Ok(rows)
}

/// The primary keys of a set of full-width rows
pub fn ids(rows: &[Row]) -> Vec<i64> {
	rows.iter()
		.map(|row| match row.first() {
			Some(Datum::Int(id)) => *id,
			other => panic!("expected an integer id, got {other:?}"),
		})
		.collect()
}

pub fn bitmap_heap_path(bitmapqual: BitmapQual) -> Path {
	Path::BitmapHeap(BitmapHeapPath {
		info: PathInfo::new(1, 10.0, 1.0, 5.0),
		bitmapqual,
	})
}

pub fn index(indexoid: Oid, clause: Expr) -> BitmapQual {
	BitmapQual::Index(IndexPath {
		info: PathInfo::new(1, 5.0, 0.0, 2.0),
		indexoid,
		indexclauses: vec![clause],
		index_only: false,
	})
}

pub fn status_is(status: &str) -> Expr {
	Expr::op(CmpOp::Eq, Expr::var(1, 2, TypeId::TEXT), Expr::constant(status, TypeId::TEXT))
}

pub fn customer_is(customer: i64) -> Expr {
	Expr::op(CmpOp::Eq, Expr::var(1, 3, TypeId::INT4), Expr::constant(customer, TypeId::INT4))
}

pub fn amount_above(amount: i64) -> Expr {
	Expr::op(CmpOp::Gt, Expr::var(1, 4, TypeId::INT8), Expr::constant(amount, TypeId::INT8))
}

/// `status = 'open' OR customer = 1` over both secondary indexes
pub fn open_or_customer_one(fixture: &Fixture) -> Plan {
	fixture
		.plan(
			BitmapQual::Or(vec![
				index(ORDERS_STATUS, status_is("open")),
				index(ORDERS_CUSTOMER, customer_is(1)),
			]),
			vec![Expr::or(vec![status_is("open"), customer_is(1)])],
		)
		.unwrap()
}
