/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns true when `until_ms` is present and no longer in the future.
pub fn is_expired_ms(until_ms: Option<u64>, now_ms: u64) -> bool {
    matches!(until_ms, Some(value) if value <= now_ms)
}

/// Rounds a remaining wait up to whole seconds, never below one.
pub fn wait_seconds_ceil(remaining_ms: u64) -> u64 {
    remaining_ms.div_ceil(1_000).max(1)
}
