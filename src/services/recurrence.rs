//! Parsing and expansion of event recurrence rules of the form
//! `FREQ=WEEKLY;INTERVAL=2;COUNT=6`.

use std::str::FromStr;

use chrono::{Duration, Months, NaiveDate};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub count: u32,
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

impl FromStr for RecurrenceRule {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut frequency = None;
        let mut interval = 1u32;
        let mut count = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("Malformed recurrence rule part: {}", part)))?;

            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(Frequency::from_str(value.trim()).ok_or_else(|| {
                        invalid(format!("Unsupported recurrence frequency: {}", value))
                    })?)
                }
                "INTERVAL" => {
                    interval = value
                        .trim()
                        .parse()
                        .map_err(|_| invalid("INTERVAL must be a positive number"))?
                }
                "COUNT" => {
                    count = Some(
                        value
                            .trim()
                            .parse::<u32>()
                            .map_err(|_| invalid("COUNT must be a positive number"))?,
                    )
                }
                other => return Err(invalid(format!("Unsupported recurrence key: {}", other))),
            }
        }

        let frequency = frequency.ok_or_else(|| invalid("Recurrence rule needs FREQ"))?;
        let count = count.ok_or_else(|| invalid("Recurrence rule needs COUNT"))?;
        if interval == 0 || count == 0 {
            return Err(invalid("INTERVAL and COUNT must be at least 1"));
        }

        Ok(RecurrenceRule {
            frequency,
            interval,
            count,
        })
    }
}

impl std::fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FREQ={};INTERVAL={};COUNT={}",
            self.frequency.as_str(),
            self.interval,
            self.count
        )
    }
}

impl RecurrenceRule {
    pub fn parse_bounded(rule: &str, max_occurrences: u32) -> Result<Self, AppError> {
        let parsed: RecurrenceRule = rule.parse()?;
        if parsed.count > max_occurrences {
            return Err(invalid(format!(
                "A series may have at most {} occurrences",
                max_occurrences
            )));
        }
        Ok(parsed)
    }

    /// Occurrence dates starting at `first`. Monthly steps clamp to the end of
    /// shorter months.
    pub fn dates_from(&self, first: NaiveDate) -> Vec<NaiveDate> {
        (0..self.count)
            .filter_map(|i| {
                let step = i.checked_mul(self.interval)?;
                match self.frequency {
                    Frequency::Daily => first.checked_add_signed(Duration::days(step.into())),
                    Frequency::Weekly => {
                        first.checked_add_signed(Duration::weeks(step.into()))
                    }
                    Frequency::Monthly => first.checked_add_months(Months::new(step)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn weekly_rule_expands_with_interval() {
        let rule: RecurrenceRule = "FREQ=WEEKLY;INTERVAL=2;COUNT=3".parse().expect("parse");
        assert_eq!(
            rule.dates_from(date(2025, 3, 3)),
            vec![date(2025, 3, 3), date(2025, 3, 17), date(2025, 3, 31)]
        );
    }

    #[test]
    fn monthly_rule_clamps_to_month_end() {
        let rule: RecurrenceRule = "freq=monthly;count=3".parse().expect("parse");
        assert_eq!(
            rule.dates_from(date(2025, 1, 31)),
            vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31)]
        );
    }

    #[test]
    fn rules_without_count_or_frequency_are_rejected() {
        assert!("FREQ=DAILY".parse::<RecurrenceRule>().is_err());
        assert!("COUNT=3".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=YEARLY;COUNT=3".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=DAILY;COUNT=0".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=DAILY;COUNT=2;BYDAY=MO".parse::<RecurrenceRule>().is_err());
    }

    #[test]
    fn occurrence_count_is_bounded() {
        assert!(RecurrenceRule::parse_bounded("FREQ=DAILY;COUNT=53", 52).is_err());
        let rule = RecurrenceRule::parse_bounded("FREQ=DAILY;COUNT=52", 52).expect("parse");
        assert_eq!(rule.to_string(), "FREQ=DAILY;INTERVAL=1;COUNT=52");
    }
}
