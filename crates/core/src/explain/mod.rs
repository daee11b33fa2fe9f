//! A structured writer for explain output.
//!
//! [`ExplainState`] accumulates one report in one of four formats. Callers describe the report as
//! nested groups and properties and the writer takes care of indentation, separators and
//! escaping. The most recently closed group can be reopened with
//! [`ExplainState::reopen_group`], which lets a caller append to a node the generic renderer has
//! already finished.

mod node;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use self::node::{RenderOptions, explain_node, explain_plan, show_instrumentation_count, show_scan_qual};
use crate::catalog::{Oid, RelationCatalog};
use crate::expr::Var;
use crate::planner::RangeTblEntry;

/// The output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExplainFormat {
	Text,
	Json,
	Xml,
	Yaml,
}

impl fmt::Display for ExplainFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Text => "text",
			Self::Json => "json",
			Self::Xml => "xml",
			Self::Yaml => "yaml",
		})
	}
}

/// What is needed to undo the last closed group
#[derive(Debug, Clone, Copy)]
struct Reopen {
	len: usize,
	indent: usize,
	stack: Option<u8>,
}

/// An explain report being written
pub struct ExplainState {
	pub format: ExplainFormat,
	/// Whether execution statistics are reported
	pub analyze: bool,
	/// Whether cost estimates are reported
	pub costs: bool,
	buf: String,
	indent: usize,
	/// Per open structured group: whether something was written into it yet, or for YAML
	/// whether the group is labelled
	grouping_stack: Vec<u8>,
	reopen: Option<Reopen>,
	catalog: Arc<dyn RelationCatalog>,
	rtable: Vec<RangeTblEntry>,
}

impl ExplainState {
	pub fn new(format: ExplainFormat, catalog: Arc<dyn RelationCatalog>, rtable: Vec<RangeTblEntry>) -> Self {
		Self {
			format,
			analyze: false,
			costs: true,
			buf: String::new(),
			indent: 0,
			grouping_stack: Vec::new(),
			reopen: None,
			catalog,
			rtable,
		}
	}

	pub fn with_analyze(mut self, analyze: bool) -> Self {
		self.analyze = analyze;
		self
	}

	pub fn with_costs(mut self, costs: bool) -> Self {
		self.costs = costs;
		self
	}

	pub fn is_text(&self) -> bool {
		self.format == ExplainFormat::Text
	}

	/// The report written so far
	pub fn output(&self) -> &str {
		&self.buf
	}

	pub fn into_output(self) -> String {
		self.buf
	}

	pub fn indent(&self) -> usize {
		self.indent
	}

	/// Sets the indentation level, leaving the last closed group reopenable
	pub fn set_indent(&mut self, indent: usize) {
		self.indent = indent;
	}

	/// Starts the report
	pub fn begin_output(&mut self) {
		self.reopen = None;
		match self.format {
			ExplainFormat::Text => {}
			ExplainFormat::Xml => {
				self.buf.push_str("<explain xmlns=\"http://www.postgresql.org/2009/explain\">\n");
				self.indent += 1;
			}
			ExplainFormat::Json => {
				self.buf.push('[');
				self.grouping_stack.push(0);
				self.indent += 1;
			}
			ExplainFormat::Yaml => self.grouping_stack.push(0),
		}
	}

	/// Finishes the report
	pub fn end_output(&mut self) {
		self.reopen = None;
		match self.format {
			ExplainFormat::Text => {}
			ExplainFormat::Xml => {
				self.indent = self.indent.saturating_sub(1);
				self.buf.push_str("</explain>");
			}
			ExplainFormat::Json => {
				self.indent = self.indent.saturating_sub(1);
				self.buf.push_str("\n]");
				self.grouping_stack.pop();
			}
			ExplainFormat::Yaml => {
				self.grouping_stack.pop();
			}
		}
	}

	/// Opens a group. `objtype` names XML elements, `label` names JSON and YAML members, and
	/// `labeled` selects an object rather than a list.
	pub fn open_group(&mut self, objtype: &str, label: Option<&str>, labeled: bool) {
		self.reopen = None;
		match self.format {
			ExplainFormat::Text => {}
			ExplainFormat::Xml => {
				self.xml_tag(objtype, false);
				self.indent += 1;
			}
			ExplainFormat::Json => {
				self.json_line_ending();
				self.spaces();
				if let Some(label) = label {
					self.buf.push_str(&json_escape(label));
					self.buf.push_str(": ");
				}
				self.buf.push(if labeled {
					'{'
				} else {
					'['
				});
				self.grouping_stack.push(0);
				self.indent += 1;
			}
			ExplainFormat::Yaml => {
				self.yaml_line_starting();
				match label {
					Some(label) => {
						self.buf.push_str(label);
						self.buf.push_str(": ");
						self.grouping_stack.push(1);
					}
					None => {
						self.buf.push_str("- ");
						self.grouping_stack.push(0);
					}
				}
				self.indent += 1;
			}
		}
	}

	/// Closes the innermost group
	pub fn close_group(&mut self, objtype: &str, labeled: bool) {
		let mut reopen = Reopen {
			len: self.buf.len(),
			indent: self.indent,
			stack: None,
		};
		match self.format {
			ExplainFormat::Text => {}
			ExplainFormat::Xml => {
				self.indent = self.indent.saturating_sub(1);
				self.xml_tag(objtype, true);
			}
			ExplainFormat::Json => {
				self.indent = self.indent.saturating_sub(1);
				self.buf.push('\n');
				self.spaces();
				self.buf.push(if labeled {
					'}'
				} else {
					']'
				});
				reopen.stack = self.grouping_stack.pop();
			}
			ExplainFormat::Yaml => {
				reopen.stack = self.grouping_stack.pop();
				self.indent = self.indent.saturating_sub(1);
			}
		}
		self.reopen = Some(reopen);
	}

	/// Undoes the most recent [`close_group`](Self::close_group), provided nothing was written
	/// since
	pub fn reopen_group(&mut self) -> Result<()> {
		let Some(reopen) = self.reopen.take() else {
			fail!("There is no closed group to reopen");
		};
		self.buf.truncate(reopen.len);
		self.indent = reopen.indent;
		if let Some(value) = reopen.stack {
			self.grouping_stack.push(value);
		}
		Ok(())
	}

	/// Writes the indentation of a text line
	pub fn indent_text(&mut self) {
		self.reopen = None;
		self.spaces();
	}

	/// Appends raw text
	pub fn append_text(&mut self, text: &str) {
		self.reopen = None;
		self.buf.push_str(text);
	}

	pub fn property_text(&mut self, label: &str, value: &str) {
		self.property(label, None, value, false);
	}

	pub fn property_integer(&mut self, label: &str, unit: Option<&str>, value: i64) {
		self.property(label, unit, &value.to_string(), true);
	}

	pub fn property_float(&mut self, label: &str, unit: Option<&str>, value: f64, ndigits: usize) {
		self.property(label, unit, &format!("{value:.ndigits$}"), true);
	}

	pub fn property_bool(&mut self, label: &str, value: bool) {
		self.property(label, None, if value {
			"true"
		} else {
			"false"
		}, true);
	}

	fn property(&mut self, label: &str, unit: Option<&str>, value: &str, numeric: bool) {
		self.reopen = None;
		match self.format {
			ExplainFormat::Text => {
				self.spaces();
				self.buf.push_str(label);
				self.buf.push_str(": ");
				self.buf.push_str(value);
				if let Some(unit) = unit {
					self.buf.push(' ');
					self.buf.push_str(unit);
				}
				self.buf.push('\n');
			}
			ExplainFormat::Xml => {
				self.spaces();
				self.buf.push('<');
				self.buf.push_str(&xml_name(label));
				self.buf.push('>');
				self.buf.push_str(&xml_escape(value));
				self.buf.push_str("</");
				self.buf.push_str(&xml_name(label));
				self.buf.push_str(">\n");
			}
			ExplainFormat::Json => {
				self.json_line_ending();
				self.spaces();
				self.buf.push_str(&json_escape(label));
				self.buf.push_str(": ");
				if numeric {
					self.buf.push_str(value);
				} else {
					self.buf.push_str(&json_escape(value));
				}
			}
			ExplainFormat::Yaml => {
				self.yaml_line_starting();
				self.buf.push_str(label);
				self.buf.push_str(": ");
				if numeric {
					self.buf.push_str(value);
				} else {
					self.buf.push_str(&json_escape(value));
				}
			}
		}
	}

	fn spaces(&mut self) {
		self.buf.extend(std::iter::repeat_n(' ', self.indent * 2));
	}

	fn xml_tag(&mut self, name: &str, closing: bool) {
		self.spaces();
		self.buf.push('<');
		if closing {
			self.buf.push('/');
		}
		self.buf.push_str(&xml_name(name));
		self.buf.push_str(">\n");
	}

	/// Separates a JSON value from the previous one in the same group
	fn json_line_ending(&mut self) {
		match self.grouping_stack.last_mut() {
			Some(written) if *written != 0 => self.buf.push(','),
			Some(written) => *written = 1,
			None => {}
		}
		self.buf.push('\n');
	}

	/// Starts a YAML line, unless it continues a list item marker
	fn yaml_line_starting(&mut self) {
		match self.grouping_stack.last_mut() {
			Some(started) if *started == 0 => *started = 1,
			_ => {
				self.buf.push('\n');
				self.spaces();
			}
		}
	}

	/// The name of the relation scanned at a 1-based range table index
	pub fn relation_name(&self, scanrelid: usize) -> Option<String> {
		let rte = scanrelid.checked_sub(1).and_then(|i| self.rtable.get(i))?;
		self.catalog.relation(rte.relid).map(|r| r.name.clone())
	}

	/// The alias of the range table entry at a 1-based index
	pub fn relation_alias(&self, scanrelid: usize) -> Option<String> {
		let rte = scanrelid.checked_sub(1).and_then(|i| self.rtable.get(i))?;
		rte.alias.clone().or_else(|| self.relation_name(scanrelid))
	}

	pub fn index_name(&self, oid: Oid) -> Option<String> {
		self.catalog.index_name(oid)
	}

	/// The name of the column a variable refers to
	pub fn column_name(&self, var: &Var) -> String {
		var.varno
			.checked_sub(1)
			.and_then(|i| self.rtable.get(i))
			.and_then(|rte| self.catalog.relation(rte.relid))
			.and_then(|rel| {
				var.varattno.checked_sub(1).and_then(|n| rel.tupdesc.attr(n)).map(|a| a.name.clone())
			})
			.unwrap_or_else(|| format!("${}.{}", var.varno, var.varattno))
	}
}

impl fmt::Debug for ExplainState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExplainState")
			.field("format", &self.format)
			.field("analyze", &self.analyze)
			.field("indent", &self.indent)
			.finish_non_exhaustive()
	}
}

fn json_escape(s: &str) -> String {
	// Serializing a str cannot fail
	serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn xml_name(s: &str) -> String {
	s.replace(' ', "-")
}

fn xml_escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			c => out.push(c),
		}
	}
	out
}
