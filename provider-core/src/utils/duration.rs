//! Go-style duration strings (`"200ms"`, `"1m30s"`, `"72h"`), the format the
//! Consul API uses for every duration field.

use crate::error::{ProviderError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:ns|us|µs|ms|s|m|h))+$").expect("valid duration regex")
});

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("valid component regex")
});

pub fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_RE.is_match(text) {
        return Err(ProviderError::invalid(format!(
            "invalid duration {:?}: expected a sequence like \"1h2m3s\" or \"250ms\"",
            text
        )));
    }

    let mut nanos: f64 = 0.0;
    for cap in COMPONENT_RE.captures_iter(text) {
        let amount: f64 = cap[1]
            .parse()
            .map_err(|_| ProviderError::invalid(format!("invalid duration {:?}", text)))?;
        let unit = match &cap[2] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            _ => 3600.0 * 1e9,
        };
        nanos += amount * unit;
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Diff-suppression for duration attributes: `"1m"` and `"60s"` are the same.
pub fn durations_equivalent(old: &Value, new: &Value) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(a), Some(b)) => match (parse_duration(a), parse_duration(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("200ms").unwrap(), Duration::from_millis(200));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn test_durations_equivalent() {
        assert!(durations_equivalent(&json!("1m0s"), &json!("60s")));
        assert!(!durations_equivalent(&json!("1m"), &json!("61s")));
        assert!(!durations_equivalent(&json!(null), &json!("1s")));
    }
}
