//! The method tables the host recognises the provider by.

use std::ptr;

use crate::cnf::PROVIDER_NAME;
use crate::exec::node::CustomExecMethods;
use crate::planner::path::{CustomPath, CustomPathMethods};
use crate::planner::plan::{CustomScan, CustomScanMethods};
use crate::scan::executor::{self, CustomScanState};
use crate::scan::{compiler, explain};

pub static IX_PATH_METHODS: CustomPathMethods = CustomPathMethods {
	name: "ix_path",
	plan_custom_path: compiler::plan_custom_path,
};

pub static IX_SCAN_METHODS: CustomScanMethods = CustomScanMethods {
	name: PROVIDER_NAME,
	create_custom_scan_state: executor::create_custom_scan_state,
};

pub static IX_EXEC_METHODS: CustomExecMethods = CustomExecMethods {
	name: "ix_exec_scan",
	begin_custom_scan: executor::begin,
	exec_custom_scan: executor::exec,
	end_custom_scan: executor::end,
	rescan_custom_scan: executor::rescan,
	explain_custom_scan: Some(explain::explain_custom_scan),
};

/// Whether a custom path was created by this provider
pub fn is_ix_custom_path(path: &CustomPath) -> bool {
	ptr::eq(path.methods, &IX_PATH_METHODS)
}

/// Whether a custom scan plan was created by this provider
pub fn is_ix_custom_scan(scan: &CustomScan) -> bool {
	ptr::eq(scan.methods, &IX_SCAN_METHODS)
}

/// Whether a running custom scan belongs to this provider
pub fn is_ix_custom_scan_state(state: &CustomScanState) -> bool {
	ptr::eq(state.methods, &IX_EXEC_METHODS)
}
