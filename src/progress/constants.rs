//! Progress constants

/// Width of the progress bar display
pub const PROGRESS_BAR_WIDTH: usize = 30;

/// Bytes per megabyte for display conversions
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// Share of the bar reserved for the compressing stage
pub const COMPRESSING_WEIGHT: f64 = 20.0;

/// Share of the bar for the transfer stages that follow compression
pub const TRANSFER_WEIGHT: f64 = 80.0;

/// Highest percentage a repository reports before the operation returns
pub const REPOSITORY_PROGRESS_CEILING: f64 = 99.0;

// vim: ts=4
