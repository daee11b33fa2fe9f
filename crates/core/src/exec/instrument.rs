/// Per-node execution statistics collected under explain analyze
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instrumentation {
	running: bool,
	/// Rows produced over all loops
	pub tuples: u64,
	/// The number of times the node was started
	pub loops: u64,
	/// Rows removed by the plan qual
	pub nfiltered1: u64,
	/// Rows removed by an index recheck
	pub nfiltered2: u64,
}

impl Instrumentation {
	/// Marks the node as running, starting a new loop if it was idle
	pub fn start_loop(&mut self) {
		if !self.running {
			self.running = true;
			self.loops += 1;
		}
	}

	pub fn count(&mut self, tuples: u64) {
		self.start_loop();
		self.tuples += tuples;
	}

	pub fn end_loop(&mut self) {
		self.running = false;
	}

	/// The average number of rows per loop
	pub fn rows_per_loop(&self) -> f64 {
		Self::per_loop(self.tuples, self.loops)
	}

	/// The average of a filter counter per loop
	pub fn filtered_per_loop(&self, which: u8) -> f64 {
		let value = match which {
			1 => self.nfiltered1,
			_ => self.nfiltered2,
		};
		Self::per_loop(value, self.loops)
	}

	fn per_loop(value: u64, loops: u64) -> f64 {
		match loops {
			0 => value as f64,
			n => value as f64 / n as f64,
		}
	}
}
