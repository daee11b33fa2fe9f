use std::sync::LazyLock;

/// The maximum number of bytes a single scan arena may account for (0 means unlimited)
pub static SCAN_ARENA_LIMIT: LazyLock<usize> = lazy_env_parse!("IXSCAN_SCAN_ARENA_LIMIT", usize, 0);

/// Whether explain output includes counters for indexes that were never probed
pub static INSTRUMENT_ALL_INDEXES: LazyLock<bool> =
	lazy_env_parse!("IXSCAN_INSTRUMENT_ALL_INDEXES", bool, false);

/// The name under which the scan provider registers its paths and plan nodes
pub const PROVIDER_NAME: &str = "ix_scan";
