//! Memory accounting for scan arenas.
//!
//! Arenas register a weak reference to themselves when created, so the bytes that live scans
//! account for can be inspected by name without keeping any scan alive.

mod registry;

pub use registry::{
	MemoryReporter, cleanup_memory_reporters, memory_reporters_allocated_by_name,
	memory_reporters_allocated_total, memory_reporters_live, register_memory_reporter,
};
