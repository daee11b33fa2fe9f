//! # ixscan core
//!
//! A custom scan provider that lets a host query engine run bitmap-driven scans over an
//! index-organized storage engine.
//!
//! The provider plugs into three points of the host:
//!
//! - path generation, where [`scan::rewriter`] augments index metadata and replaces bitmap heap
//!   paths with custom paths;
//! - plan finalization, where [`scan::compiler`] turns a chosen custom path into a
//!   [`planner::plan::CustomScan`] node;
//! - execution and explain, where [`scan::executor`] drives the scan through the storage
//!   engine's bitmap-scan primitive and [`scan::explain`] renders the probe tree with per-index
//!   counters.
//!
//! The host surfaces the provider talks to (catalog, optimizer paths, plan nodes, executor
//! services, snapshots, storage, explain output) are modelled in the remaining modules so the
//! pipeline can run end to end against the in-memory engine in [`storage::mem`].

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod catalog;
pub mod cnf;
pub mod err;
pub mod exec;
pub mod explain;
pub mod expr;
pub mod mem;
pub mod planner;
pub mod scan;
pub mod storage;
pub mod txn;
