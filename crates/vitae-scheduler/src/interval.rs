//! Recurrence expressions for alert tasks.
//!
//! Tasks store classic five-field cron (`min hour dom month dow`, Sunday = 0
//! or 7). The `cron` crate wants a leading seconds field and numbers weekdays
//! from 1 = Sunday, so expressions are normalised before parsing: a `0`
//! seconds field is prepended and numeric weekdays are rewritten as names.
//! Six- and seven-field expressions are taken as already in `cron` syntax.
//! All times are UTC.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

const WEEKDAYS: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parse a task interval.
pub fn parse(expr: &str) -> Result<Schedule> {
    let normalised = normalise(expr)?;
    Schedule::from_str(&normalised).map_err(|e| invalid(expr, e.to_string()))
}

/// First firing of `expr` strictly after `after`.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse(expr)?
        .after(&after)
        .next()
        .ok_or_else(|| invalid(expr, "expression never fires again".to_string()))
}

fn normalise(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = weekday_names(expr, fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(invalid(expr, format!("expected 5 fields, got {n}"))),
    }
}

/// Rewrite numeric weekdays (`1`, `1-5`, `0,6`) as names. Step values after
/// a `/` are counts, not weekdays, and are left alone.
fn weekday_names(expr: &str, field: &str) -> Result<String> {
    let mut parts = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        let base = base
            .split('-')
            .map(|tok| match tok.parse::<usize>() {
                Ok(n) if n < WEEKDAYS.len() => Ok(WEEKDAYS[n].to_string()),
                Ok(n) => Err(invalid(expr, format!("weekday {n} out of range"))),
                Err(_) => Ok(tok.to_string()),
            })
            .collect::<Result<Vec<_>>>()?
            .join("-");
        parts.push(match step {
            Some(step) => format!("{base}/{step}"),
            None => base,
        });
    }
    Ok(parts.join(","))
}

fn invalid(expr: &str, reason: String) -> SchedulerError {
    SchedulerError::InvalidInterval {
        expr: expr.to_string(),
        reason,
    }
}
