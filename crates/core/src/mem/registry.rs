use std::collections::BTreeMap;
use std::sync::Weak;

use parking_lot::RwLock;

static MEMORY_REPORTERS: RwLock<Vec<MemoryReporterEntry>> = RwLock::new(Vec::new());

struct MemoryReporterEntry {
	/// The name of the reporting arena
	name: String,
	/// The weak reference to the reporter
	reporter: Weak<dyn MemoryReporter>,
}

/// Trait for arenas that can report the memory they currently account for
pub trait MemoryReporter: Send + Sync {
	/// Returns the number of bytes currently accounted by this arena
	fn memory_allocated(&self) -> usize;
}

/// Returns the total memory accounted by all live reporters
pub fn memory_reporters_allocated_total() -> usize {
	let reporters = MEMORY_REPORTERS.read();
	reporters
		.iter()
		.filter_map(|r| r.reporter.upgrade())
		.map(|reporter| reporter.memory_allocated())
		.sum()
}

/// Returns the memory accounted by each live reporter, summed by name
pub fn memory_reporters_allocated_by_name() -> BTreeMap<String, usize> {
	let reporters = MEMORY_REPORTERS.read();
	let mut output = BTreeMap::new();
	for r in reporters.iter() {
		// Dropped arenas no longer report
		if let Some(reporter) = r.reporter.upgrade() {
			*output.entry(r.name.clone()).or_insert(0) += reporter.memory_allocated();
		}
	}
	output
}

/// Returns the number of reporters which are still alive
pub fn memory_reporters_live() -> usize {
	MEMORY_REPORTERS.read().iter().filter(|r| r.reporter.strong_count() > 0).count()
}

/// Registers a new memory reporter
pub fn register_memory_reporter(name: &str, reporter: Weak<dyn MemoryReporter>) {
	let mut reporters = MEMORY_REPORTERS.write();
	// Clean up dead weak references while we're here
	reporters.retain(|r| r.reporter.strong_count() > 0);
	reporters.push(MemoryReporterEntry {
		name: name.to_owned(),
		reporter,
	});
}

/// Cleans up dead weak references from the memory reporters list
pub fn cleanup_memory_reporters() {
	let mut reporters = MEMORY_REPORTERS.write();
	reporters.retain(|r| r.reporter.strong_count() > 0);
}
