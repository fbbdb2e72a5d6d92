//! Aggregate usage statistics for the current billing period.

use serde::Serialize;

/// Snapshot of storage usage, computed fresh on every listing request and
/// never persisted.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Number of stored objects.
    pub total_files: u64,

    /// Sum of all object sizes in bytes.
    pub total_size: u64,

    /// Bytes attributed to the current calendar-month billing period.
    pub current_period_size: u64,

    /// Quota ceiling minus current-period bytes, floored at zero.
    pub remaining_quota: u64,

    /// Whole days until the period rolls over to the next month.
    pub days_until_reset: i64,
}
