//! Snapshots and tuple visibility.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A commit sequence number
pub type CommitSeqNo = u64;

/// An immutable view of which tuple versions are visible.
///
/// A snapshot sees every version committed at or before its commit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
	csn: CommitSeqNo,
}

impl Snapshot {
	pub fn new(csn: CommitSeqNo) -> Self {
		Self {
			csn,
		}
	}

	pub fn csn(&self) -> CommitSeqNo {
		self.csn
	}

	/// Whether a version created at `created` and deleted at `deleted` is visible
	pub fn is_visible(&self, created: CommitSeqNo, deleted: Option<CommitSeqNo>) -> bool {
		created <= self.csn && deleted.is_none_or(|d| d > self.csn)
	}
}

/// A source of the snapshot to use for a new scan
pub trait SnapshotSource: Send + Sync {
	fn current_snapshot(&self) -> Arc<Snapshot>;
}

impl SnapshotSource for Snapshot {
	fn current_snapshot(&self) -> Arc<Snapshot> {
		Arc::new(*self)
	}
}
