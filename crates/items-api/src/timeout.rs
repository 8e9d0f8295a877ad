use std::time::Duration;

/// Default per-request timeout, matching the API Gateway integration limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(29);

pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// The Lambda execution limit.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Read a request timeout such as "29s", "1m30s" or plain seconds ("30"),
/// rejecting values outside [`MIN_TIMEOUT`]..=[`MAX_TIMEOUT`].
pub fn bounded_timeout(raw: &str) -> Result<Duration, String> {
    let timeout = humantime::parse_duration(raw)
        .ok()
        .or_else(|| raw.parse::<u64>().ok().map(Duration::from_secs))
        .ok_or_else(|| format!("cannot parse `{raw}` as a duration"))?;

    if timeout < MIN_TIMEOUT {
        return Err(format!(
            "`{raw}` is too short, minimum is {}",
            humantime::format_duration(MIN_TIMEOUT)
        ));
    }
    if timeout > MAX_TIMEOUT {
        return Err(format!(
            "`{raw}` is too long, maximum is {}",
            humantime::format_duration(MAX_TIMEOUT)
        ));
    }
    Ok(timeout)
}
