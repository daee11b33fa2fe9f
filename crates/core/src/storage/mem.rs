//! An in-memory index-organized storage engine.
//!
//! Every table is a multi-version map keyed by its primary key. Secondary indexes map their key
//! columns, followed by the primary key, onto the commit stamps of the row version they index.
//! Tables declared without a primary key are keyed by a synthesized row identifier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use anyhow::Result;
use parking_lot::RwLock;

use crate::catalog::{
	Attribute, IndexDescr, IndexField, IndexOrganized, Oid, ROWID_ATTNUM, RelKind, Relation,
	TableDescr, TupleDesc, TypeId,
};
use crate::err::Error;
use crate::exec::{ExecutionContext, PlanState, ScanArena};
use crate::expr::{Datum, Row, exec_qual};
use crate::planner::plan::{BitmapIndexScan, Plan};
use crate::scan::counters::InstrumentationCounters;
use crate::storage::{BitmapScan, BitmapScanArgs, KeyBitmap, StorageEngine};
use crate::txn::{CommitSeqNo, Snapshot, SnapshotSource};

const TARGET: &str = "ixscan::core::storage::mem";

/// The definition of an index, by 0-based column positions
#[derive(Debug, Clone)]
pub struct IndexDef {
	pub oid: Oid,
	pub name: String,
	pub columns: Vec<usize>,
}

impl IndexDef {
	pub fn new(oid: u32, name: &str, columns: &[usize]) -> Self {
		Self {
			oid: Oid(oid),
			name: name.to_owned(),
			columns: columns.to_vec(),
		}
	}
}

/// The definition of a table
#[derive(Debug, Clone)]
pub struct TableDef {
	pub oid: Oid,
	pub name: String,
	pub relkind: RelKind,
	pub columns: Vec<Attribute>,
	pub primary_key: Option<IndexDef>,
	pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
	created: CommitSeqNo,
	deleted: Option<CommitSeqNo>,
}

impl Stamp {
	fn visible(&self, snapshot: &Snapshot) -> bool {
		snapshot.is_visible(self.created, self.deleted)
	}
}

#[derive(Debug, Clone)]
struct Version {
	stamp: Stamp,
	values: Row,
}

type PrimaryKey = Vec<Datum>;

#[derive(Debug, Default)]
struct TableData {
	primary: BTreeMap<PrimaryKey, Vec<Version>>,
	/// One map per secondary index, in descriptor order after the primary
	secondary: Vec<BTreeMap<Vec<Datum>, Vec<Stamp>>>,
}

#[derive(Debug)]
struct MemTable {
	name: String,
	descr: Arc<TableDescr>,
	natts: usize,
	next_rowid: AtomicI64,
	data: RwLock<TableData>,
}

impl MemTable {
	fn primary_key(&self, values: &[Datum]) -> Option<PrimaryKey> {
		let primary = self.descr.primary();
		if !self.descr.has_primary() {
			return Some(vec![Datum::Int(self.next_rowid.fetch_add(1, Ordering::AcqRel))]);
		}
		let key: PrimaryKey =
			primary.fields.iter().map(|f| values.get(f.attnum).cloned().unwrap_or(Datum::Null)).collect();
		(!key.iter().any(Datum::is_null)).then_some(key)
	}

	/// The key of a secondary index entry: the index columns followed by the primary key
	fn index_key(index: &IndexDescr, values: &[Datum], pk: &[Datum]) -> Vec<Datum> {
		index
			.fields
			.iter()
			.map(|f| values.get(f.attnum).cloned().unwrap_or(Datum::Null))
			.chain(pk.iter().cloned())
			.collect()
	}

	/// A row holding only the columns an index entry carries, nulls elsewhere
	fn sparse_row(&self, index: &IndexDescr, key: &[Datum]) -> Row {
		let mut row = vec![Datum::Null; self.natts];
		let pk_fields = self.descr.primary().fields.iter();
		for (field, value) in index.fields.iter().chain(pk_fields).zip(key) {
			if field.attnum == ROWID_ATTNUM {
				continue;
			}
			if let Some(slot) = row.get_mut(field.attnum) {
				*slot = value.clone();
			}
		}
		row
	}

	/// Probes one index with the conditions of a bitmap index scan
	fn probe(&self, node: &BitmapIndexScan, snapshot: &Snapshot, bitmap: &mut KeyBitmap) -> Result<()> {
		let Some(position) = self.descr.index_position(node.indexid) else {
			fail!("Index {} does not belong to table {}", node.indexid, self.name);
		};
		let index = &self.descr.indices()[position];
		let data = self.data.read();
		if position == TableDescr::PRIMARY_INDEX_NUMBER {
			// The primary index holds whole rows
			for (pk, versions) in data.primary.iter() {
				let Some(version) = versions.iter().rev().find(|v| v.stamp.visible(snapshot)) else {
					continue;
				};
				if exec_qual(&node.indexqual, &version.values) {
					bitmap.insert(&pk[0])?;
				}
			}
			return Ok(());
		}
		let Some(entries) = data.secondary.get(position - 1) else {
			fail!("Index {} of table {} has no storage", index.name, self.name);
		};
		for (key, stamps) in entries.iter() {
			if !stamps.iter().any(|s| s.visible(snapshot)) {
				continue;
			}
			if exec_qual(&node.indexqual, &self.sparse_row(index, key)) {
				bitmap.insert(&key[index.nfields()])?;
			}
		}
		Ok(())
	}

	/// Returns the version of a row visible to the snapshot
	fn fetch(&self, key: &Datum, snapshot: &Snapshot) -> Option<Row> {
		let data = self.data.read();
		let versions = data.primary.get(std::slice::from_ref(key))?;
		versions.iter().rev().find(|v| v.stamp.visible(snapshot)).map(|v| v.values.clone())
	}
}

/// An in-memory index-organized storage engine
#[derive(Debug, Default)]
pub struct MemEngine {
	tables: RwLock<HashMap<Oid, Arc<MemTable>>>,
	csn: AtomicU64,
}

impl MemEngine {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Creates a table and returns the relation describing it
	pub fn create_table(self: &Arc<Self>, def: TableDef) -> Result<Arc<Relation>> {
		let tupdesc = Arc::new(TupleDesc::new(def.columns));
		let describe = |index: &IndexDef| -> Result<IndexDescr> {
			let mut fields = Vec::with_capacity(index.columns.len());
			for &attnum in &index.columns {
				let Some(attr) = tupdesc.attr(attnum) else {
					return Err(Error::Storage(format!(
						"Index {} refers to missing column {attnum}",
						index.name
					))
					.into());
				};
				fields.push(IndexField {
					attnum,
					input_type: attr.type_id,
				});
			}
			Ok(IndexDescr {
				oid: index.oid,
				name: index.name.clone(),
				fields,
			})
		};
		let primary = def.primary_key.as_ref().map(describe).transpose()?;
		let secondary = def.indexes.iter().map(describe).collect::<Result<Vec<_>>>()?;
		let descr = Arc::new(TableDescr::new(def.oid, &def.name, primary, secondary));
		let index_names = descr
			.indices()
			.iter()
			.filter(|i| i.oid != Oid::INVALID)
			.map(|i| (i.oid, i.name.clone()))
			.collect();
		let table = Arc::new(MemTable {
			name: def.name.clone(),
			descr: descr.clone(),
			natts: tupdesc.natts(),
			next_rowid: AtomicI64::new(1),
			data: RwLock::new(TableData {
				primary: BTreeMap::new(),
				secondary: vec![BTreeMap::new(); descr.num_indices() - 1],
			}),
		});
		self.tables.write().insert(def.oid, table);
		debug!(target: TARGET, table = %def.name, indices = descr.num_indices(), "Created table");
		Ok(Arc::new(Relation {
			oid: def.oid,
			name: def.name,
			relkind: def.relkind,
			tupdesc,
			index_organized: Some(IndexOrganized {
				descr,
				storage: self.clone(),
			}),
			index_names,
		}))
	}

	fn table(&self, oid: Oid) -> Result<Arc<MemTable>> {
		match self.tables.read().get(&oid) {
			Some(table) => Ok(table.clone()),
			None => Err(Error::Storage(format!("Table {oid} does not exist")).into()),
		}
	}

	/// Commits a new row, returning its commit sequence number
	pub fn insert(&self, oid: Oid, values: Row) -> Result<CommitSeqNo> {
		let table = self.table(oid)?;
		if values.len() != table.natts {
			return Err(Error::Storage(format!(
				"Table {} expects {} columns, got {}",
				table.name,
				table.natts,
				values.len()
			))
			.into());
		}
		let Some(pk) = table.primary_key(&values) else {
			return Err(Error::Storage(format!("Primary key of {} cannot be null", table.name)).into());
		};
		let mut data = table.data.write();
		let versions = data.primary.entry(pk.clone()).or_default();
		if versions.iter().any(|v| v.stamp.deleted.is_none()) {
			return Err(Error::Storage(format!("Duplicate primary key {pk:?} in {}", table.name)).into());
		}
		let csn = self.csn.fetch_add(1, Ordering::AcqRel) + 1;
		let stamp = Stamp {
			created: csn,
			deleted: None,
		};
		for (index, entries) in table.descr.indices().iter().skip(1).zip(data.secondary.iter_mut()) {
			entries.entry(MemTable::index_key(index, &values, &pk)).or_default().push(stamp);
		}
		data.primary.entry(pk).or_default().push(Version {
			stamp,
			values,
		});
		trace!(target: TARGET, table = %table.name, csn, "Inserted row");
		Ok(csn)
	}

	/// Deletes the live row with a primary key, returning whether one existed
	pub fn delete(&self, oid: Oid, pk: &[Datum]) -> Result<bool> {
		let table = self.table(oid)?;
		let mut data = table.data.write();
		let TableData {
			primary,
			secondary,
		} = &mut *data;
		let Some(version) = primary
			.get_mut(pk)
			.and_then(|versions| versions.iter_mut().find(|v| v.stamp.deleted.is_none()))
		else {
			return Ok(false);
		};
		let csn = self.csn.fetch_add(1, Ordering::AcqRel) + 1;
		for (index, entries) in table.descr.indices().iter().skip(1).zip(secondary.iter_mut()) {
			let key = MemTable::index_key(index, &version.values, pk);
			if let Some(stamp) = entries
				.get_mut(&key)
				.and_then(|stamps| stamps.iter_mut().find(|s| s.created == version.stamp.created))
			{
				stamp.deleted = Some(csn);
			}
		}
		version.stamp.deleted = Some(csn);
		trace!(target: TARGET, table = %table.name, csn, "Deleted row");
		Ok(true)
	}

	/// The latest commit sequence number
	pub fn csn(&self) -> CommitSeqNo {
		self.csn.load(Ordering::Acquire)
	}

	/// Evaluates a bitmap plan tree into the set of candidate keys
	fn gather(
		&self,
		table: &MemTable,
		state: &mut PlanState,
		args: &GatherArgs<'_>,
	) -> Result<KeyBitmap> {
		let bitmap = match &state.plan {
			Plan::BitmapIndexScan(node) => {
				let mut bitmap = KeyBitmap::new(args.key_type)?;
				let position = table.descr.index_position(node.indexid);
				let counters = args.counters.and_then(|c| position.and_then(|p| c.index(p))).cloned();
				// Attribute the probe to its index for as long as it runs
				let _scope = counters.map(|c| args.ctx.counters().scoped(c));
				table.probe(node, args.snapshot, &mut bitmap)?;
				args.ctx.counters().record_call(bitmap.len());
				trace!(target: TARGET, index = %node.indexid, rows = bitmap.len(), "Probed index");
				bitmap
			}
			Plan::BitmapAnd(_) | Plan::BitmapOr(_) => {
				let and = matches!(state.plan, Plan::BitmapAnd(_));
				let mut combined: Option<KeyBitmap> = None;
				for child in state.children.iter_mut() {
					let bitmap = self.gather(table, child, args)?;
					combined = Some(match combined {
						None => bitmap,
						Some(acc) if and => acc.and(bitmap)?,
						Some(acc) => acc.or(bitmap)?,
					});
				}
				match combined {
					Some(bitmap) => bitmap,
					None => fail!("{} without inputs", state.plan.node_name()),
				}
			}
			other => fail!("{} cannot produce a bitmap", other.node_name()),
		};
		if let Some(instr) = state.instrument.as_mut() {
			instr.count(bitmap.len());
			instr.end_loop();
		}
		Ok(bitmap)
	}
}

struct GatherArgs<'a> {
	key_type: TypeId,
	snapshot: &'a Snapshot,
	counters: Option<&'a InstrumentationCounters>,
	ctx: &'a ExecutionContext,
}

impl SnapshotSource for MemEngine {
	fn current_snapshot(&self) -> Arc<Snapshot> {
		Arc::new(Snapshot::new(self.csn()))
	}
}

impl StorageEngine for MemEngine {
	fn name(&self) -> &str {
		"mem"
	}

	fn make_bitmap_scan(&self, args: BitmapScanArgs<'_>) -> Result<Box<dyn BitmapScan>> {
		let table = self.table(args.relation.oid)?;
		let gather = GatherArgs {
			key_type: args.key_type,
			snapshot: &args.snapshot,
			counters: args.counters.as_deref(),
			ctx: args.ctx,
		};
		let bitmap = self.gather(&table, args.plan_state, &gather)?;
		let charged = bitmap.memory_size();
		args.arena.charge(charged)?;
		debug!(target: TARGET, table = %table.name, candidates = bitmap.len(), "Built bitmap scan");
		Ok(Box::new(MemBitmapScan {
			table,
			keys: bitmap.keys().into_iter(),
			snapshot: args.snapshot,
			arena: args.arena,
			charged,
		}))
	}
}

/// A cursor fetching the candidates of a bitmap through the primary index
struct MemBitmapScan {
	table: Arc<MemTable>,
	keys: std::vec::IntoIter<Datum>,
	snapshot: Arc<Snapshot>,
	arena: Arc<ScanArena>,
	charged: usize,
}

impl BitmapScan for MemBitmapScan {
	fn fetch_next(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
		for key in self.keys.by_ref() {
			let row = self.table.fetch(&key, &self.snapshot);
			ctx.counters().record_call(u64::from(row.is_some()));
			if row.is_some() {
				return Ok(row);
			}
		}
		Ok(None)
	}
}

impl Drop for MemBitmapScan {
	fn drop(&mut self) {
		self.arena.discharge(self.charged);
	}
}
