use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};

const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_HOUR: u64 = 3_600;

/// Render a duration in hours using Slurm's `[D-]HH:MM:SS` time-limit grammar.
///
/// Fractional seconds are truncated. The day component only appears when it
/// is non-zero.
///
/// # Examples
///
/// ```
/// use hybrid_submit::utils::format_time_limit;
///
/// assert_eq!(format_time_limit(1.5), "01:30:00");
/// assert_eq!(format_time_limit(25.0), "1-01:00:00");
/// assert_eq!(format_time_limit(0.01), "00:00:36");
/// ```
pub fn format_time_limit(duration_hours: f64) -> String {
    // `as` saturates, so negative or NaN input renders as zero.
    let total_secs = (duration_hours * SECS_PER_HOUR as f64).floor() as u64;
    format_time_limit_secs(total_secs)
}

pub fn format_time_limit_secs(total_secs: u64) -> String {
    let days = total_secs / SECS_PER_DAY;
    let rem = total_secs % SECS_PER_DAY;
    let hours = rem / SECS_PER_HOUR;
    let minutes = (rem % SECS_PER_HOUR) / 60;
    let seconds = rem % 60;

    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Parse a `[D-]HH:MM:SS` time limit back into whole seconds.
///
/// # Examples
///
/// ```
/// use hybrid_submit::utils::parse_time_limit_secs;
///
/// assert_eq!(parse_time_limit_secs("01:30:00").unwrap(), 5400);
/// assert_eq!(parse_time_limit_secs("1-01:00:00").unwrap(), 90000);
/// ```
pub fn parse_time_limit_secs(time_str: &str) -> Result<u64> {
    let (days, clock) = match time_str.split_once('-') {
        Some((days, clock)) => (
            days.parse::<u64>()
                .context("Invalid day count in D-HH:MM:SS format")?,
            clock,
        ),
        None => (0, time_str),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(anyhow!(
            "Invalid time limit '{time_str}'. Expected HH:MM:SS or D-HH:MM:SS"
        ));
    };
    let hours = hours.parse::<u64>().context("Invalid hours")?;
    let minutes = minutes.parse::<u64>().context("Invalid minutes")?;
    let seconds = seconds.parse::<u64>().context("Invalid seconds")?;

    Ok(days * SECS_PER_DAY + hours * SECS_PER_HOUR + minutes * 60 + seconds)
}

/// Single-quote a value for a POSIX shell.
///
/// Every embedded `'` becomes `'"'"'` (close quote, double-quoted quote,
/// reopen quote).
///
/// # Examples
///
/// ```
/// use hybrid_submit::utils::shell_quote;
///
/// assert_eq!(shell_quote("plain"), "'plain'");
/// assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
/// ```
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// Current time as an ISO-8601 UTC timestamp.
pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::process::Command;

    #[test]
    fn test_format_time_limit() {
        assert_eq!(format_time_limit(2.0), "02:00:00");
        assert_eq!(format_time_limit(1.5), "01:30:00");
        assert_eq!(format_time_limit(24.0), "1-00:00:00");
        assert_eq!(format_time_limit(25.0), "1-01:00:00");
        assert_eq!(format_time_limit(49.75), "2-01:45:00");
        // 1/3600 h is one second; anything below truncates to zero.
        assert_eq!(format_time_limit(0.0001), "00:00:00");
    }

    #[test]
    fn test_parse_time_limit_invalid() {
        assert!(parse_time_limit_secs("").is_err());
        assert!(parse_time_limit_secs("01:30").is_err());
        assert!(parse_time_limit_secs("x-01:00:00").is_err());
        assert!(parse_time_limit_secs("01:aa:00").is_err());
    }

    #[test]
    fn test_now_is_utc() {
        let now = now_utc_iso();
        assert!(now.ends_with("+00:00"), "{now}");
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }

    fn sh_echo(quoted: &str) -> String {
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("printf '%s' {quoted}"))
            .output()
            .unwrap();
        String::from_utf8(output.stdout).unwrap()
    }

    #[test]
    fn test_shell_quote_survives_shell() {
        for value in ["", "a b", "it's", "''", "$HOME `id` \"x\"", "a\nb"] {
            assert_eq!(sh_echo(&shell_quote(value)), value);
        }
    }

    proptest! {
        #[test]
        fn prop_time_limit_round_trips(total in 0u64..10_000_000) {
            let rendered = format_time_limit_secs(total);
            prop_assert_eq!(parse_time_limit_secs(&rendered).unwrap(), total);
            prop_assert_eq!(rendered.contains('-'), total >= SECS_PER_DAY);
        }

        #[test]
        fn prop_shell_quote_round_trips(value in "[ -~]{0,24}") {
            prop_assert_eq!(sh_echo(&shell_quote(&value)), value);
        }
    }
}
