use crate::expr::{Datum, Row, TargetEntry};

/// Evaluates a target list over a scanned row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
	targetlist: Vec<TargetEntry>,
}

impl Projection {
	pub fn new(targetlist: Vec<TargetEntry>) -> Self {
		Self {
			targetlist,
		}
	}

	/// Projects a row. Without a row the result is null-extended.
	pub fn project(&self, row: Option<&[Datum]>) -> Row {
		match row {
			Some(row) => self.targetlist.iter().map(|te| te.expr.eval(row)).collect(),
			None => vec![Datum::Null; self.targetlist.len()],
		}
	}
}
