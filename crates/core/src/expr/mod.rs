//! Scalar expressions, evaluation and deparsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Oid, TypeId};

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Datum {
	Null,
	Bool(bool),
	Int(i64),
	Text(String),
}

impl Datum {
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// An estimate of the bytes needed to hold this value
	pub fn size(&self) -> usize {
		std::mem::size_of::<Self>()
			+ match self {
				Self::Text(s) => s.len(),
				_ => 0,
			}
	}
}

impl From<i64> for Datum {
	fn from(v: i64) -> Self {
		Self::Int(v)
	}
}

impl From<&str> for Datum {
	fn from(v: &str) -> Self {
		Self::Text(v.to_owned())
	}
}

impl From<bool> for Datum {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

/// A tuple of column values
pub type Row = Vec<Datum>;

/// A reference to a column of a range table entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
	/// The 1-based range table index
	pub varno: usize,
	/// The 1-based attribute number
	pub varattno: usize,
	pub vartype: TypeId,
	pub vartypmod: i32,
	pub varcollid: Oid,
}

/// A constant of a known type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Const {
	pub value: Datum,
	pub type_id: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

impl CmpOp {
	pub fn symbol(&self) -> &'static str {
		match self {
			Self::Eq => "=",
			Self::Ne => "<>",
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
		}
	}

	/// The operator obtained by swapping the operands
	pub fn commute(&self) -> Self {
		match self {
			Self::Lt => Self::Gt,
			Self::Le => Self::Ge,
			Self::Gt => Self::Lt,
			Self::Ge => Self::Le,
			op => *op,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
	And,
	Or,
	Not,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
	Var(Var),
	Const(Const),
	Op {
		op: CmpOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	Bool {
		op: BoolOp,
		args: Vec<Expr>,
	},
}

impl Expr {
	pub fn var(varno: usize, varattno: usize, vartype: TypeId) -> Self {
		Self::Var(Var {
			varno,
			varattno,
			vartype,
			vartypmod: -1,
			varcollid: Oid::INVALID,
		})
	}

	pub fn constant(value: impl Into<Datum>, type_id: TypeId) -> Self {
		Self::Const(Const {
			value: value.into(),
			type_id,
		})
	}

	pub fn op(op: CmpOp, left: Expr, right: Expr) -> Self {
		Self::Op {
			op,
			left: Box::new(left),
			right: Box::new(right),
		}
	}

	pub fn and(args: Vec<Expr>) -> Self {
		Self::Bool {
			op: BoolOp::And,
			args,
		}
	}

	pub fn or(args: Vec<Expr>) -> Self {
		Self::Bool {
			op: BoolOp::Or,
			args,
		}
	}

	/// Splits a comparison into a column reference, the operator seen from the column side, and
	/// the constant it is compared against.
	pub fn as_var_op_const(&self) -> Option<(&Var, CmpOp, &Datum)> {
		let Self::Op {
			op,
			left,
			right,
		} = self
		else {
			return None;
		};
		match (left.as_ref(), right.as_ref()) {
			(Self::Var(v), Self::Const(c)) => Some((v, *op, &c.value)),
			(Self::Const(c), Self::Var(v)) => Some((v, op.commute(), &c.value)),
			_ => None,
		}
	}

	/// Evaluates the expression against a row laid out by attribute number
	pub fn eval(&self, row: &[Datum]) -> Datum {
		match self {
			Self::Var(v) => row.get(v.varattno.wrapping_sub(1)).cloned().unwrap_or(Datum::Null),
			Self::Const(c) => c.value.clone(),
			Self::Op {
				op,
				left,
				right,
			} => {
				let (l, r) = (left.eval(row), right.eval(row));
				if l.is_null() || r.is_null() {
					return Datum::Null;
				}
				Datum::Bool(match op {
					CmpOp::Eq => l == r,
					CmpOp::Ne => l != r,
					CmpOp::Lt => l < r,
					CmpOp::Le => l <= r,
					CmpOp::Gt => l > r,
					CmpOp::Ge => l >= r,
				})
			}
			Self::Bool {
				op: BoolOp::Not,
				args,
			} => match args.first().map(|a| a.eval(row)) {
				Some(Datum::Bool(b)) => Datum::Bool(!b),
				_ => Datum::Null,
			},
			Self::Bool {
				op,
				args,
			} => {
				// Three-valued logic: a decisive operand wins over NULL
				let decisive = matches!(op, BoolOp::Or);
				let mut saw_null = false;
				for arg in args {
					match arg.eval(row) {
						Datum::Bool(b) if b == decisive => return Datum::Bool(decisive),
						Datum::Bool(_) => {}
						_ => saw_null = true,
					}
				}
				if saw_null {
					Datum::Null
				} else {
					Datum::Bool(!decisive)
				}
			}
		}
	}

	/// Renders the expression, naming columns through the given resolver
	pub fn deparse(&self, names: &dyn Fn(&Var) -> String) -> String {
		match self {
			Self::Var(v) => names(v),
			Self::Const(c) => match &c.value {
				Datum::Null => "NULL".to_owned(),
				Datum::Bool(b) => b.to_string(),
				Datum::Int(i) if *i < 0 => format!("'{i}'::{}", c.type_id.name()),
				Datum::Int(i) => i.to_string(),
				Datum::Text(s) => format!("'{}'::{}", s.replace('\'', "''"), c.type_id.name()),
			},
			Self::Op {
				op,
				left,
				right,
			} => format!("({} {} {})", left.deparse(names), op.symbol(), right.deparse(names)),
			Self::Bool {
				op: BoolOp::Not,
				args,
			} => format!("(NOT {})", args.first().map(|a| a.deparse(names)).unwrap_or_default()),
			Self::Bool {
				op,
				args,
			} => {
				let sep = match op {
					BoolOp::Or => " OR ",
					_ => " AND ",
				};
				let parts: Vec<String> = args.iter().map(|a| a.deparse(names)).collect();
				format!("({})", parts.join(sep))
			}
		}
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.deparse(&|v| format!("${}.{}", v.varno, v.varattno)))
	}
}

/// Whether every qual of an implicitly AND-ed list is true for the row
pub fn exec_qual(quals: &[Expr], row: &[Datum]) -> bool {
	quals.iter().all(|q| q.eval(row) == Datum::Bool(true))
}

/// Renders an implicitly AND-ed qual list, or nothing for an empty list
pub fn deparse_qual(quals: &[Expr], names: &dyn Fn(&Var) -> String) -> Option<String> {
	match quals {
		[] => None,
		[single] => Some(single.deparse(names)),
		many => {
			let parts: Vec<String> = many.iter().map(|q| q.deparse(names)).collect();
			Some(format!("({})", parts.join(" AND ")))
		}
	}
}

/// An output column of a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetEntry {
	pub expr: Expr,
	/// The 1-based output position
	pub resno: usize,
	pub resname: Option<String>,
}

impl TargetEntry {
	pub fn new(expr: Expr, resno: usize, resname: Option<String>) -> Self {
		Self {
			expr,
			resno,
			resname,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn status_eq(value: &str) -> Expr {
		Expr::op(CmpOp::Eq, Expr::var(1, 2, TypeId::TEXT), Expr::constant(value, TypeId::TEXT))
	}

	fn names(v: &Var) -> String {
		["id", "status"][v.varattno - 1].to_owned()
	}

	#[test]
	fn eval_comparison_and_null() {
		let row = vec![Datum::Int(1), Datum::from("x")];
		assert_eq!(status_eq("x").eval(&row), Datum::Bool(true));
		assert_eq!(status_eq("y").eval(&row), Datum::Bool(false));
		let row = vec![Datum::Int(1), Datum::Null];
		assert_eq!(status_eq("x").eval(&row), Datum::Null);
		assert!(!exec_qual(&[status_eq("x")], &row));
	}

	#[test]
	fn eval_three_valued_or() {
		let row = vec![Datum::Int(1), Datum::Null];
		let id_one =
			Expr::op(CmpOp::Eq, Expr::var(1, 1, TypeId::INT4), Expr::constant(1, TypeId::INT4));
		assert_eq!(Expr::or(vec![status_eq("x"), id_one.clone()]).eval(&row), Datum::Bool(true));
		assert_eq!(Expr::and(vec![status_eq("x"), id_one]).eval(&row), Datum::Null);
	}

	#[test]
	fn commuted_constant_comparison() {
		let expr =
			Expr::op(CmpOp::Lt, Expr::constant(5, TypeId::INT4), Expr::var(1, 1, TypeId::INT4));
		let (var, op, value) = expr.as_var_op_const().unwrap();
		assert_eq!(var.varattno, 1);
		assert_eq!(op, CmpOp::Gt);
		assert_eq!(value, &Datum::Int(5));
	}

	#[test]
	fn deparse_matches_host_style() {
		assert_eq!(status_eq("x").deparse(&names), "(status = 'x'::text)");
		let id_gt =
			Expr::op(CmpOp::Gt, Expr::var(1, 1, TypeId::INT4), Expr::constant(3, TypeId::INT4));
		assert_eq!(
			deparse_qual(&[status_eq("it's"), id_gt.clone()], &names).unwrap(),
			"((status = 'it''s'::text) AND (id > 3))"
		);
		assert_eq!(
			Expr::or(vec![status_eq("x"), id_gt]).deparse(&names),
			"((status = 'x'::text) OR (id > 3))"
		);
		assert_eq!(deparse_qual(&[], &names), None);
	}
}
