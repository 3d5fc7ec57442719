use chrono::Utc;

/// Current wall clock in seconds since epoch
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Read a non-empty environment variable
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Whole minutes elapsed between `start` and `at`, `None` if `at` lies before `start`
pub fn minute_index(start: i64, at: i64) -> Option<usize> {
    let elapsed = at.checked_sub(start)?;
    if elapsed < 0 {
        return None;
    }
    usize::try_from(elapsed / 60).ok()
}

/// Render a delay in seconds as `35s`, `2m 5s` or `1h 2m 3s`
pub fn format_delay(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
