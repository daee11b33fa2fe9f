//! The custom access paths of the provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::planner::path::{BitmapHeapPath, CustomPath, Path};
use crate::scan::methods::IX_PATH_METHODS;

/// The kind of access a custom path performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessPathDescriptor {
	/// Gather candidate keys from the indexes, then fetch them through the primary index
	BitmapHeapPath,
}

impl AccessPathDescriptor {
	pub fn name(&self) -> &'static str {
		match self {
			Self::BitmapHeapPath => "BitmapHeapPath",
		}
	}
}

impl fmt::Display for AccessPathDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A custom path owned by this provider
pub type CustomPathWrapper = CustomPath;

/// Wraps a bitmap heap path, keeping its estimates so the cost-based ranking is unchanged
pub fn transform_path(source: BitmapHeapPath) -> CustomPathWrapper {
	CustomPath {
		info: source.info.clone(),
		custom_paths: vec![Path::BitmapHeap(source)],
		custom_private: AccessPathDescriptor::BitmapHeapPath,
		methods: &IX_PATH_METHODS,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::Oid;
	use crate::planner::path::{BitmapQual, IndexPath, PathInfo};
	use crate::scan::methods::is_ix_custom_path;

	#[test]
	fn wrapper_keeps_the_estimates() {
		let mut info = PathInfo::new(1, 12.0, 4.25, 38.5);
		info.parallel_safe = false;
		let source = BitmapHeapPath {
			info: info.clone(),
			bitmapqual: BitmapQual::Index(IndexPath {
				info: PathInfo::new(1, 12.0, 0.0, 4.25),
				indexoid: Oid(11),
				indexclauses: Vec::new(),
				index_only: false,
			}),
		};
		let wrapper = transform_path(source.clone());
		assert_eq!(wrapper.info, info);
		assert_eq!(wrapper.custom_private, AccessPathDescriptor::BitmapHeapPath);
		assert!(is_ix_custom_path(&wrapper));
		let [Path::BitmapHeap(nested)] = wrapper.custom_paths.as_slice() else {
			panic!("expected one nested bitmap heap path");
		};
		assert_eq!(nested, &source);
	}
}
