use std::fmt;

use thiserror::Error;

use crate::catalog::TypeId;

/// The five-character error classification reported alongside an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
	/// The requested feature is not supported for this storage kind
	FeatureNotSupported,
	/// A memory limit was exceeded
	OutOfMemory,
	/// An internal error which indicates a bug
	Internal,
}

impl ErrorCode {
	/// The classification code as reported to clients
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::FeatureNotSupported => "0A000",
			Self::OutOfMemory => "53200",
			Self::Internal => "XX000",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An error originating from the scan provider
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The scan provider encountered unreachable logic
	#[error("The scan provider encountered unreachable logic: {0}")]
	Unreachable(String),

	/// A path kind which cannot be executed over an index-organized table
	#[error("{message}")]
	FeatureNotSupported {
		table: String,
		message: String,
		detail: String,
	},

	/// A scan arena exceeded its configured limit
	#[error("Out of memory in '{context}': failed to account {requested} bytes with a limit of {limit} bytes")]
	OutOfMemory {
		context: String,
		requested: usize,
		limit: usize,
	},

	/// The leading primary key type cannot drive a key bitmap
	#[error("Key type {0} is not supported by bitmap scans")]
	UnsupportedKeyType(TypeId),

	/// A scan operation was requested outside of an open scan
	#[error("The scan is not open")]
	ScanNotOpen,

	/// The storage engine reported an error
	#[error("Storage error: {0}")]
	Storage(String),
}

impl Error {
	/// Creates an unreachable error which records the location of the caller
	#[track_caller]
	pub fn unreachable<T: fmt::Display>(message: T) -> Error {
		let location = std::panic::Location::caller();
		let message = format!("{}:{}: {}", location.file(), location.line(), message);
		Error::Unreachable(message)
	}

	/// The error raised when a table sample is requested over an index-organized table
	pub fn tablesample_not_supported(table: &str) -> Error {
		Error::FeatureNotSupported {
			table: table.to_owned(),
			message: format!("index-organized table \"{table}\" does not support TABLESAMPLE"),
			detail: "Sample scan is not supported for index-organized tables yet.".to_owned(),
		}
	}

	/// The classification code reported for this error
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::FeatureNotSupported {
				..
			} => ErrorCode::FeatureNotSupported,
			Self::OutOfMemory {
				..
			} => ErrorCode::OutOfMemory,
			_ => ErrorCode::Internal,
		}
	}

	/// Extra detail to display below the primary message
	pub fn detail(&self) -> Option<&str> {
		match self {
			Self::FeatureNotSupported {
				detail,
				..
			} => Some(detail),
			_ => None,
		}
	}

	/// Whether this error is expected during normal operation
	pub fn is_user_facing(&self) -> bool {
		matches!(self.code(), ErrorCode::FeatureNotSupported)
	}
}
