//! Catalog metadata for relations, their columns and their indexes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::storage::StorageEngine;

/// An object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Oid(pub u32);

impl Oid {
	pub const INVALID: Oid = Oid(0);
}

impl fmt::Display for Oid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The identifier of a data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
	pub const BOOL: TypeId = TypeId(16);
	pub const INT8: TypeId = TypeId(20);
	pub const INT2: TypeId = TypeId(21);
	pub const INT4: TypeId = TypeId(23);
	pub const TEXT: TypeId = TypeId(25);
	pub const OID: TypeId = TypeId(26);
	pub const TID: TypeId = TypeId(27);

	/// The name used when casting constants of this type
	pub fn name(&self) -> &'static str {
		match *self {
			Self::BOOL => "boolean",
			Self::INT8 => "bigint",
			Self::INT2 => "smallint",
			Self::INT4 => "integer",
			Self::TEXT => "text",
			Self::OID => "oid",
			Self::TID => "tid",
			_ => "unknown",
		}
	}

	/// Whether values of this type are integers
	pub fn is_integer(&self) -> bool {
		matches!(*self, Self::INT2 | Self::INT4 | Self::INT8 | Self::OID | Self::TID)
	}
}

impl fmt::Display for TypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name(), self.0)
	}
}

/// A column of a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
	pub name: String,
	pub type_id: TypeId,
	pub typmod: i32,
	pub collation: Oid,
}

impl Attribute {
	pub fn new(name: &str, type_id: TypeId) -> Self {
		Self {
			name: name.to_owned(),
			type_id,
			typmod: -1,
			collation: Oid::INVALID,
		}
	}
}

/// The ordered column list of a relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleDesc {
	pub attrs: Vec<Attribute>,
}

impl TupleDesc {
	pub fn new(attrs: Vec<Attribute>) -> Self {
		Self {
			attrs,
		}
	}

	pub fn natts(&self) -> usize {
		self.attrs.len()
	}

	/// Returns the column at a 0-based position
	pub fn attr(&self, attnum: usize) -> Option<&Attribute> {
		self.attrs.get(attnum)
	}

	/// Returns the 0-based position of a named column
	pub fn position(&self, name: &str) -> Option<usize> {
		self.attrs.iter().position(|a| a.name == name)
	}
}

/// The attribute number reported for the synthesized row identifier key
pub const ROWID_ATTNUM: usize = usize::MAX;

/// A key field of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
	/// The 0-based column position, or [`ROWID_ATTNUM`]
	pub attnum: usize,
	pub input_type: TypeId,
}

/// An index of an index-organized table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescr {
	pub oid: Oid,
	pub name: String,
	pub fields: Vec<IndexField>,
}

impl IndexDescr {
	pub fn nfields(&self) -> usize {
		self.fields.len()
	}

	/// Whether the index has a key field on the given 0-based column
	pub fn contains(&self, attnum: usize) -> bool {
		self.fields.iter().any(|f| f.attnum == attnum)
	}
}

/// The index layout of an index-organized table.
///
/// The primary index always sits at position 0. Tables declared without a primary key are
/// organized by a synthesized row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescr {
	pub oid: Oid,
	indices: Vec<IndexDescr>,
	has_primary: bool,
}

impl TableDescr {
	/// The position of the primary index
	pub const PRIMARY_INDEX_NUMBER: usize = 0;

	pub fn new(oid: Oid, name: &str, primary: Option<IndexDescr>, secondary: Vec<IndexDescr>) -> Self {
		let has_primary = primary.is_some();
		let primary = primary.unwrap_or_else(|| IndexDescr {
			oid: Oid::INVALID,
			name: format!("{name}_rowid"),
			fields: vec![IndexField {
				attnum: ROWID_ATTNUM,
				input_type: TypeId::TID,
			}],
		});
		let mut indices = Vec::with_capacity(secondary.len() + 1);
		indices.push(primary);
		indices.extend(secondary);
		Self {
			oid,
			indices,
			has_primary,
		}
	}

	/// Whether the primary key was declared rather than synthesized
	pub fn has_primary(&self) -> bool {
		self.has_primary
	}

	pub fn primary(&self) -> &IndexDescr {
		&self.indices[Self::PRIMARY_INDEX_NUMBER]
	}

	pub fn indices(&self) -> &[IndexDescr] {
		&self.indices
	}

	pub fn num_indices(&self) -> usize {
		self.indices.len()
	}

	/// Returns the ordinal position of an index
	pub fn index_position(&self, oid: Oid) -> Option<usize> {
		self.indices.iter().position(|i| i.oid == oid)
	}
}

/// The kind of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelKind {
	Table,
	MatView,
	View,
	Foreign,
	Partitioned,
}

/// The storage side of a relation which is organized by its primary key
#[derive(Clone)]
pub struct IndexOrganized {
	pub descr: Arc<TableDescr>,
	pub storage: Arc<dyn StorageEngine>,
}

impl fmt::Debug for IndexOrganized {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IndexOrganized").field("descr", &self.descr).finish_non_exhaustive()
	}
}

/// An opened relation
#[derive(Debug, Clone)]
pub struct Relation {
	pub oid: Oid,
	pub name: String,
	pub relkind: RelKind,
	pub tupdesc: Arc<TupleDesc>,
	/// Set when the relation is stored by an index-organized engine
	pub index_organized: Option<IndexOrganized>,
	/// Index names, keyed by index oid
	pub index_names: HashMap<Oid, String>,
}

impl Relation {
	pub fn is_index_organized(&self) -> bool {
		self.index_organized.is_some()
	}

	pub fn descr(&self) -> Option<&Arc<TableDescr>> {
		self.index_organized.as_ref().map(|i| &i.descr)
	}
}

/// Lookup of relation metadata
pub trait RelationCatalog: Send + Sync {
	/// Opens a relation by oid
	fn relation(&self, oid: Oid) -> Option<Arc<Relation>>;

	/// Returns the name of an index
	fn index_name(&self, oid: Oid) -> Option<String>;
}

/// A catalog held in memory
#[derive(Default)]
pub struct Catalog {
	relations: RwLock<HashMap<Oid, Arc<Relation>>>,
}

impl Catalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, relation: Arc<Relation>) {
		self.relations.write().insert(relation.oid, relation);
	}
}

impl RelationCatalog for Catalog {
	fn relation(&self, oid: Oid) -> Option<Arc<Relation>> {
		self.relations.read().get(&oid).cloned()
	}

	fn index_name(&self, oid: Oid) -> Option<String> {
		self.relations.read().values().find_map(|r| r.index_names.get(&oid).cloned())
	}
}
