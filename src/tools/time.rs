//! Date and time handler: current time, day arithmetic on the proleptic
//! Gregorian calendar, date differences, weekday lookup, countdowns and
//! named-timezone conversion.

use super::Tool;
use crate::error::{AgentError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Source of the current instant. Production uses the system clock;
/// tests inject a fixed one because wall-clock queries are otherwise
/// non-deterministic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for deterministic tests.
#[derive(Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Operations the router can request from the time tool
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimeParams {
    Now,
    Utc,
    Offset { days: i64 },
    Diff { from: String, to: String },
    Weekday { date: Option<String> },
    Countdown { date: String },
    Timezone { zone: String },
}

const CITY_TABLE: [(&str, Tz); 10] = [
    ("北京", chrono_tz::Asia::Shanghai),
    ("上海", chrono_tz::Asia::Shanghai),
    ("广州", chrono_tz::Asia::Shanghai),
    ("深圳", chrono_tz::Asia::Shanghai),
    ("纽约", chrono_tz::America::New_York),
    ("伦敦", chrono_tz::Europe::London),
    ("东京", chrono_tz::Asia::Tokyo),
    ("巴黎", chrono_tz::Europe::Paris),
    ("悉尼", chrono_tz::Australia::Sydney),
    ("UTC", chrono_tz::UTC),
];

/// Time tool bound to a home timezone and an injectable clock.
#[derive(Debug)]
pub struct TimeTool {
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl Default for TimeTool {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeTool {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            zone: chrono_tz::Asia::Shanghai,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.zone).date_naive()
    }

    fn run(&self, params: TimeParams) -> Result<String> {
        match params {
            TimeParams::Now => {
                let now = self.clock.now().with_timezone(&self.zone);
                Ok(format!(
                    "{} {} ({})",
                    now.format("%Y-%m-%d %H:%M:%S"),
                    now.weekday(),
                    self.zone
                ))
            }
            TimeParams::Utc => {
                let now = self.clock.now();
                Ok(format!(
                    "{} {} (UTC)",
                    now.format("%Y-%m-%d %H:%M:%S"),
                    now.weekday()
                ))
            }
            TimeParams::Offset { days } => {
                let base = self.today();
                let target = add_days(base, days)?;
                let label = if days >= 0 { "from now" } else { "ago" };
                Ok(format!(
                    "{} days {} is {} ({})",
                    days.abs(),
                    label,
                    target.format("%Y-%m-%d"),
                    target.weekday()
                ))
            }
            TimeParams::Diff { from, to } => {
                let from = parse_date(&from)?;
                let to = parse_date(&to)?;
                Ok(format!(
                    "{} and {} are {} days apart",
                    from.format("%Y-%m-%d"),
                    to.format("%Y-%m-%d"),
                    day_diff(from, to)
                ))
            }
            TimeParams::Weekday { date } => {
                let target = match date {
                    Some(raw) => parse_date(&raw)?,
                    None => self.today(),
                };
                Ok(format!(
                    "{} is a {}",
                    target.format("%Y-%m-%d"),
                    weekday_name(target)
                ))
            }
            TimeParams::Countdown { date } => {
                let target = parse_date(&date)?;
                let today = self.today();
                let remaining = (target - today).num_days();
                if remaining >= 0 {
                    Ok(format!(
                        "{} days until {}",
                        remaining,
                        target.format("%Y-%m-%d")
                    ))
                } else {
                    Ok(format!(
                        "{} passed {} days ago",
                        target.format("%Y-%m-%d"),
                        -remaining
                    ))
                }
            }
            TimeParams::Timezone { zone } => {
                let tz = lookup_zone(&zone)?;
                let now = self.clock.now().with_timezone(&tz);
                Ok(format!(
                    "{}: {} {} ({})",
                    zone,
                    now.format("%Y-%m-%d %H:%M:%S"),
                    now.weekday(),
                    tz
                ))
            }
        }
    }
}

impl Tool for TimeTool {
    fn name(&self) -> &'static str {
        "time"
    }

    fn description(&self) -> &'static str {
        "Current time, day offsets, date differences, weekday lookup, countdowns and timezone conversion"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["now", "utc", "offset", "diff", "weekday", "countdown", "timezone"]
                },
                "days": { "type": "integer" },
                "from": { "type": "string" },
                "to": { "type": "string" },
                "date": { "type": "string" },
                "zone": { "type": "string" }
            },
            "required": ["op"]
        })
    }

    fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value>> + Send + '_>> {
        Box::pin(async move {
            let params: TimeParams = serde_json::from_value(parameters)
                .map_err(|e| AgentError::ToolExecution(format!("invalid parameters: {}", e)))?;
            debug!(target: "tool_agent::time", ?params, "running time query");
            let result = self.run(params)?;
            Ok(serde_json::Value::String(result))
        })
    }
}

/// Add a signed day delta to a date on the proleptic Gregorian calendar.
pub fn add_days(base: NaiveDate, days: i64) -> Result<NaiveDate> {
    base.checked_add_signed(Duration::days(days))
        .ok_or_else(|| AgentError::ToolExecution(format!("day offset out of range: {}", days)))
}

/// Absolute whole-day count between two dates' midnights.
pub fn day_diff(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days().abs()
}

fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AgentError::ToolExecution(format!("invalid date: {}", raw)))
}

fn lookup_zone(name: &str) -> Result<Tz> {
    CITY_TABLE
        .iter()
        .find(|(city, _)| name.eq_ignore_ascii_case(city) || name.contains(city))
        .map(|(_, tz)| *tz)
        .ok_or_else(|| AgentError::UnknownTimezone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    /// 2024-06-01 04:00 UTC = 2024-06-01 12:00 in Asia/Shanghai.
    fn fixed_tool() -> TimeTool {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap();
        TimeTool::new().with_clock(Arc::new(FixedClock(instant)))
    }

    #[tokio::test]
    async fn test_now_under_fixed_clock() {
        let result = fixed_tool().execute(json!({ "op": "now" })).await.unwrap();
        let text = result.as_str().unwrap();
        assert!(text.starts_with("2024-06-01 12:00:00"));
        assert!(text.contains("Sat"));
    }

    #[tokio::test]
    async fn test_day_offset() {
        let result = fixed_tool()
            .execute(json!({ "op": "offset", "days": 3 }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "3 days from now is 2024-06-04 (Tue)");

        let result = fixed_tool()
            .execute(json!({ "op": "offset", "days": -1 }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "1 days ago is 2024-05-31 (Fri)");
    }

    #[tokio::test]
    async fn test_date_diff() {
        let result = fixed_tool()
            .execute(json!({ "op": "diff", "from": "2024-01-01", "to": "2024-12-31" }))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("365 days apart"));
    }

    #[test]
    fn test_add_then_diff_roundtrip() {
        let base = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        for delta in [-400_i64, -1, 0, 1, 2, 365, 1000] {
            let shifted = add_days(base, delta).unwrap();
            assert_eq!(day_diff(shifted, base), delta.abs());
        }
    }

    #[test]
    fn test_leap_day_arithmetic() {
        let base = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(
            add_days(base, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            add_days(base, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[tokio::test]
    async fn test_weekday() {
        let result = fixed_tool()
            .execute(json!({ "op": "weekday" }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "2024-06-01 is a Saturday");

        let result = fixed_tool()
            .execute(json!({ "op": "weekday", "date": "2024-01-01" }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "2024-01-01 is a Monday");
    }

    #[tokio::test]
    async fn test_countdown() {
        let result = fixed_tool()
            .execute(json!({ "op": "countdown", "date": "2024-06-11" }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "10 days until 2024-06-11");

        let result = fixed_tool()
            .execute(json!({ "op": "countdown", "date": "2024-05-30" }))
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "2024-05-30 passed 2 days ago");
    }

    #[tokio::test]
    async fn test_timezone_lookup() {
        let result = fixed_tool()
            .execute(json!({ "op": "timezone", "zone": "东京" }))
            .await
            .unwrap();
        // 04:00 UTC is 13:00 in Tokyo.
        assert!(result.as_str().unwrap().contains("13:00:00"));
    }

    #[tokio::test]
    async fn test_unknown_timezone() {
        let err = fixed_tool()
            .execute(json!({ "op": "timezone", "zone": "火星" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTimezone(_)));
    }

    #[tokio::test]
    async fn test_invalid_date_is_reported() {
        let err = fixed_tool()
            .execute(json!({ "op": "diff", "from": "not-a-date", "to": "2024-01-01" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }
}
