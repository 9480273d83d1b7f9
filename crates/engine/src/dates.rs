use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// How a normalized date was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Parsed,
    /// Parsed, but the year was a known-bad sentinel and was replaced.
    Corrected,
    /// Missing or unparseable; the current time was substituted.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedDate {
    pub value: NaiveDateTime,
    pub source: DateSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// Tried in order, after RFC 3339.
    pub datetime_formats: Vec<String>,
    /// Tried after every date-time format; these carry no time of day.
    pub date_formats: Vec<String>,
    /// Years that indicate an upstream extraction bug rather than a real date.
    pub sentinel_years: Vec<i32>,
}

impl Default for DateConfig {
    fn default() -> Self {
        let owned = |fmts: &[&str]| fmts.iter().map(|f| f.to_string()).collect();
        Self {
            datetime_formats: owned(&[
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%d %H:%M",
                "%Y-%m-%dT%H:%M:%S",
                "%Y/%m/%d %H:%M:%S",
                "%Y/%m/%d %H:%M",
                "%Y年%m月%d日 %H:%M:%S",
                "%Y年%m月%d日 %H:%M",
                "%Y年%m月%d日%H:%M",
                "%Y.%m.%d %H:%M",
            ]),
            date_formats: owned(&["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d", "%m/%d/%Y"]),
            sentinel_years: vec![1970, 2001],
        }
    }
}

/// Turns raw date strings into timestamps; never fails.
#[derive(Debug, Clone, Default)]
pub struct DateNormalizer {
    config: DateConfig,
}

impl DateNormalizer {
    pub fn new(config: DateConfig) -> Self {
        Self { config }
    }

    /// Normalizes `raw` relative to `now` (local wall-clock time).
    pub fn normalize(&self, raw: &str, now: NaiveDateTime) -> NormalizedDate {
        let Some((parsed, has_time)) = self.parse(raw.trim()) else {
            return NormalizedDate { value: now, source: DateSource::Fallback };
        };

        if parsed.year() != now.year() && self.config.sentinel_years.contains(&parsed.year()) {
            let time = if has_time && parsed.time() != NaiveTime::MIN {
                parsed.time()
            } else {
                now.time()
            };
            tracing::debug!(raw, year = parsed.year(), "replacing sentinel year with today");
            return NormalizedDate {
                value: now.date().and_time(time),
                source: DateSource::Corrected,
            };
        }

        NormalizedDate { value: parsed, source: DateSource::Parsed }
    }

    /// First successful parse and whether the format carried a time of day.
    fn parse(&self, raw: &str) -> Option<(NaiveDateTime, bool)> {
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some((dt.naive_local(), true));
        }
        for fmt in &self.config.datetime_formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some((dt, true));
            }
        }
        for fmt in &self.config.date_formats {
            if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
                return Some((d.and_time(NaiveTime::MIN), false));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    fn now() -> NaiveDateTime {
        dt(2026, 10, 19, 9, 30, 0)
    }

    #[test]
    fn parses_full_datetime() {
        let n = DateNormalizer::default().normalize("2024-03-15 12:34:56", now());
        assert_eq!(n.value, dt(2024, 3, 15, 12, 34, 56));
        assert_eq!(n.source, DateSource::Parsed);
    }

    #[test]
    fn parses_locale_variants() {
        let norm = DateNormalizer::default();
        assert_eq!(norm.normalize("2024年3月15日 08:05", now()).value, dt(2024, 3, 15, 8, 5, 0));
        assert_eq!(norm.normalize("2024/03/15 18:00", now()).value, dt(2024, 3, 15, 18, 0, 0));
        assert_eq!(norm.normalize("2024-03-15T07:00:00+08:00", now()).value, dt(2024, 3, 15, 7, 0, 0));
    }

    #[test]
    fn date_only_is_midnight() {
        let norm = DateNormalizer::default();
        assert_eq!(norm.normalize("2024-03-15", now()).value, dt(2024, 3, 15, 0, 0, 0));
        assert_eq!(norm.normalize("2024年03月15日", now()).value, dt(2024, 3, 15, 0, 0, 0));
        assert_eq!(norm.normalize("03/15/2024", now()).value, dt(2024, 3, 15, 0, 0, 0));
    }

    #[test]
    fn unparseable_falls_back_to_now() {
        let norm = DateNormalizer::default();
        for raw in ["", "昨天", "15th of March", "2024-13-45"] {
            let n = norm.normalize(raw, now());
            assert_eq!(n.value, now(), "{raw}");
            assert_eq!(n.source, DateSource::Fallback);
        }
    }

    #[test]
    fn sentinel_year_keeps_plausible_time() {
        let n = DateNormalizer::default().normalize("1970-01-01 14:20:00", now());
        assert_eq!(n.value, dt(2026, 10, 19, 14, 20, 0));
        assert_eq!(n.source, DateSource::Corrected);
    }

    #[test]
    fn sentinel_year_at_midnight_takes_current_time() {
        let norm = DateNormalizer::default();
        assert_eq!(norm.normalize("2001-01-01 00:00:00", now()).value, now());
        assert_eq!(norm.normalize("1970-01-01", now()).value, now());
    }

    #[test]
    fn sentinel_equal_to_current_year_is_kept() {
        let norm = DateNormalizer::new(DateConfig {
            sentinel_years: vec![2026],
            ..Default::default()
        });
        let n = norm.normalize("2026-02-01 10:00", now());
        assert_eq!(n.value, dt(2026, 2, 1, 10, 0, 0));
        assert_eq!(n.source, DateSource::Parsed);
    }

    #[test]
    fn sentinel_list_is_configurable() {
        let norm = DateNormalizer::new(DateConfig {
            sentinel_years: vec![2023],
            ..Default::default()
        });
        assert_eq!(norm.normalize("2023-05-05 11:00", now()).source, DateSource::Corrected);
        assert_eq!(norm.normalize("1970-01-01 11:00", now()).source, DateSource::Parsed);
    }
}
