//! Utility functions for nodesync

use std::time::Duration;

/// Longest prefix of an untrusted payload that ever reaches the logs
pub const LOG_PREVIEW_LEN: usize = 100;

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if s.ends_with(|c: char| c.is_ascii_digit()) {
        (s, "s")
    } else {
        let split = s.char_indices().last().map(|(i, _)| i).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs = |scale: u64| {
        num.checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => secs(60),
        "h" => secs(3600),
        _ => Err(crate::Error::InvalidConfig(format!(
            "unknown duration unit: {}",
            unit
        ))),
    }
}

/// Hostname reported in registration requests
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Printable prefix of raw bytes for diagnostics
pub fn preview(data: &[u8]) -> String {
    let end = data.len().min(LOG_PREVIEW_LEN);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Retry with exponential backoff
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt + 1 < max_retries => {
                tracing::warn!(
                    "Attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}

/// Validate a group or client name (non-empty, printable, reasonable length)
pub fn validate_name(kind: &str, name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::Protocol(format!("{} cannot be empty", kind)));
    }

    if name.len() > 1024 {
        return Err(crate::Error::Protocol(format!(
            "{} too long (max 1024 bytes)",
            kind
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::Protocol(format!(
            "{} contains invalid characters",
            kind
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert!(matches!(
            parse_duration("9999999999999999999m"),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(parse_duration("9999999999999999999h").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_preview_truncates() {
        let data = vec![b'a'; 500];
        assert_eq!(preview(&data).len(), LOG_PREVIEW_LEN);
        assert_eq!(preview(b"short"), "short");
    }

    #[test]
    fn test_local_hostname_not_empty() {
        assert!(!local_hostname().is_empty());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("client_name", "node-1").is_ok());
        assert!(validate_name("client_name", "").is_err());
        assert!(validate_name("client_name", "bad\nname").is_err());
        assert!(validate_name("group_name", &"x".repeat(2000)).is_err());
    }

    #[tokio::test]
    async fn test_retry_with_backoff_eventually_succeeds() {
        let mut calls = 0;
        let result = retry_with_backoff(
            || {
                calls += 1;
                let current = calls;
                async move {
                    if current < 3 {
                        Err(crate::Error::ConnectionFailed("busy".into()))
                    } else {
                        Ok(current)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_gives_up() {
        let result: crate::Result<()> = retry_with_backoff(
            || async { Err(crate::Error::ConnectionFailed("busy".into())) },
            2,
            Duration::from_millis(1),
        )
        .await;
        assert!(matches!(result, Err(crate::Error::ConnectionFailed(_))));
    }
}
