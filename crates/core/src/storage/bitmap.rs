//! Candidate sets of primary keys gathered from index probes.

use std::collections::BTreeSet;

use anyhow::Result;
use roaring::RoaringTreemap;

use crate::catalog::TypeId;
use crate::err::Error;
use crate::expr::Datum;

/// Maps a signed key onto an unsigned one with the same ordering
fn encode(v: i64) -> u64 {
	(v as u64) ^ (1 << 63)
}

fn decode(v: u64) -> i64 {
	(v ^ (1 << 63)) as i64
}

/// A set of leading primary key values, iterated in ascending key order
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBitmap {
	/// Integer keys in a compressed bitmap
	Integer(RoaringTreemap),
	/// Any other ordered key
	Ordered(BTreeSet<Datum>),
}

impl KeyBitmap {
	pub fn new(key_type: TypeId) -> Result<Self> {
		if key_type.is_integer() {
			Ok(Self::Integer(RoaringTreemap::new()))
		} else if matches!(key_type, TypeId::TEXT | TypeId::BOOL) {
			Ok(Self::Ordered(BTreeSet::new()))
		} else {
			Err(Error::UnsupportedKeyType(key_type).into())
		}
	}

	/// Adds a key. Null keys never identify a row and are skipped.
	pub fn insert(&mut self, key: &Datum) -> Result<()> {
		match (self, key) {
			(_, Datum::Null) => {}
			(Self::Integer(bitmap), Datum::Int(v)) => {
				bitmap.insert(encode(*v));
			}
			(Self::Ordered(set), key) => {
				set.insert(key.clone());
			}
			(Self::Integer(_), key) => {
				return Err(Error::Storage(format!("Key {key:?} does not fit an integer bitmap")).into());
			}
		}
		Ok(())
	}

	pub fn len(&self) -> u64 {
		match self {
			Self::Integer(bitmap) => bitmap.len(),
			Self::Ordered(set) => set.len() as u64,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Keeps the keys present in both sets
	pub fn and(self, other: Self) -> Result<Self> {
		match (self, other) {
			(Self::Integer(a), Self::Integer(b)) => Ok(Self::Integer(a & b)),
			(Self::Ordered(a), Self::Ordered(b)) => Ok(Self::Ordered(&a & &b)),
			_ => fail!("Cannot intersect bitmaps over different key kinds"),
		}
	}

	/// Keeps the keys present in either set
	pub fn or(self, other: Self) -> Result<Self> {
		match (self, other) {
			(Self::Integer(a), Self::Integer(b)) => Ok(Self::Integer(a | b)),
			(Self::Ordered(mut a), Self::Ordered(b)) => {
				a.extend(b);
				Ok(Self::Ordered(a))
			}
			_ => fail!("Cannot union bitmaps over different key kinds"),
		}
	}

	/// The keys in ascending order
	pub fn keys(&self) -> Vec<Datum> {
		match self {
			Self::Integer(bitmap) => bitmap.iter().map(|v| Datum::Int(decode(v))).collect(),
			Self::Ordered(set) => set.iter().cloned().collect(),
		}
	}

	/// An estimate of the bytes held by the set
	pub fn memory_size(&self) -> usize {
		match self {
			Self::Integer(bitmap) => bitmap.serialized_size(),
			Self::Ordered(set) => set.iter().map(Datum::size).sum(),
		}
	}
}
