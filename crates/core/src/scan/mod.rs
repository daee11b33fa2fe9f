//! The bitmap-driven custom scan provider.
//!
//! Installing the provider with [`register`] adds two path generation hooks. The rewriter
//! ([`rewriter`]) prepares index metadata and swaps bitmap heap paths for custom paths carrying
//! an [`path::AccessPathDescriptor`]. When such a path wins, the compiler ([`compiler`]) freezes it
//! into a [`crate::planner::plan::CustomScan`], which the executor ([`executor`]) runs through the
//! storage engine's bitmap-scan primitive. Per-index work is collected in [`counters`] and
//! rendered by [`explain`].

pub mod compiler;
pub mod counters;
pub mod executor;
pub mod explain;
pub mod methods;
pub mod path;
pub mod rewriter;

use std::sync::Arc;

use crate::planner::allpaths::PlannerHooks;
use crate::scan::rewriter::{IxPlainRelPathlistHook, IxRelPathlistHook};

const TARGET: &str = "ixscan::core::scan";

/// Installs the provider's path generation hooks, chaining any previously installed hook
pub fn register(hooks: &mut PlannerHooks) {
	hooks.set_plain_rel_pathlist = Some(Arc::new(IxPlainRelPathlistHook));
	hooks.install_rel_pathlist(|prev| Arc::new(IxRelPathlistHook::new(prev)));
	info!(target: TARGET, "Registered the index-organized scan provider");
}
