//! Duration parsing and formatting for human-readable values like "60s", "30m".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "45s", "30m", "24h", "14d".
///
/// Supported units:
/// - `d` - days (24 hours)
/// - `h` - hours
/// - `m` - minutes
/// - `s` - seconds
/// - `ms` - milliseconds
///
/// The input is case-insensitive and whitespace is trimmed.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let (num, unit) = if s.ends_with("ms") {
        (s.trim_end_matches("ms"), "ms")
    } else if s.ends_with('d') {
        (s.trim_end_matches('d'), "d")
    } else if s.ends_with('h') {
        (s.trim_end_matches('h'), "h")
    } else if s.ends_with('m') {
        (s.trim_end_matches('m'), "m")
    } else if s.ends_with('s') {
        (s.trim_end_matches('s'), "s")
    } else {
        anyhow::bail!("Duration must end with d, h, m, s, or ms");
    };

    let num: u64 = num.parse().with_context(|| "Invalid number in duration")?;

    let duration = match unit {
        "d" => Duration::from_secs(
            num.checked_mul(24 * 60 * 60)
                .context("Duration is too large")?,
        ),
        "h" => Duration::from_secs(num.checked_mul(60 * 60).context("Duration is too large")?),
        "m" => Duration::from_secs(num.checked_mul(60).context("Duration is too large")?),
        "s" => Duration::from_secs(num),
        "ms" => Duration::from_millis(num),
        _ => unreachable!(),
    };

    Ok(duration)
}

/// Format an elapsed run duration for display: "1h 2m", "2m 5s", or "45s".
///
/// Uses the two largest relevant units and rounds down, which is plenty of
/// precision for a run summary.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    let minutes = secs / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde deserializer for optional duration strings.
///
/// Use with `#[serde(default, deserialize_with = "deserialize_duration_opt")]`.
pub fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => parse_duration(&s).map(Some).map_err(de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(24 * 3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(30 * 60));
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_case_and_whitespace() {
        assert_eq!(parse_duration(" 1H ").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("\t45S\n").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_duration("1x").is_err());
        assert!(parse_duration("1").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1d").is_err());
        assert!(parse_duration("1.5h").is_err());
    }

    #[test]
    fn test_parse_overflow_rejected() {
        let max = u64::MAX.to_string();
        assert!(parse_duration(&format!("{max}d")).is_err());
        assert!(parse_duration(&format!("{max}s")).is_ok());
    }

    #[test]
    fn test_format_elapsed_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0s");
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45s");
    }

    #[test]
    fn test_format_elapsed_minutes() {
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(60)), "1m 0s");
    }

    #[test]
    fn test_format_elapsed_hours() {
        assert_eq!(format_elapsed(Duration::from_secs(3720)), "1h 2m");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1h 0m");
    }

    #[test]
    fn test_serde_deserialize() {
        #[derive(Deserialize)]
        struct TestConfig {
            #[serde(deserialize_with = "deserialize_duration")]
            timeout: Duration,
        }

        let config: TestConfig = toml::from_str(r#"timeout = "60s""#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_serde_deserialize_opt() {
        #[derive(Deserialize)]
        struct TestConfig {
            #[serde(default, deserialize_with = "deserialize_duration_opt")]
            timeout: Option<Duration>,
        }

        let config: TestConfig = toml::from_str(r#"timeout = "30m""#).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(30 * 60)));

        let config: TestConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout, None);
    }
}
