//! Next-fire computation for one-time and cron triggers.
//!
//! Cron expressions use the classic five fields (`minute hour day month
//! weekday`). Each field is expanded here and handed to the `cron` crate as an
//! explicit list, which keeps weekday numbering (`0`/`7` = Sunday) and the
//! day-of-month / day-of-week OR rule of classic cron intact.
//!
//! With a time zone, fields match local wall-clock time. A local time that
//! does not exist on a given day (inside a daylight-saving gap) is skipped for
//! that day rather than moved to the end of the gap.

use std::collections::BTreeSet;

use {
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    cron::Schedule,
};

use crate::{
    Error, Result,
    parse::parse_absolute_time_ms,
    types::{Trigger, TriggerSpec},
};

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Names accepted in place of numbers, starting at `name_base`.
    names: &'static [&'static str],
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
};
// 7 is accepted as an alias for Sunday and folded to 0.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day of week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
    name_base: 0,
};

/// A parsed five-field cron expression bound to a time zone.
#[derive(Debug, Clone)]
pub struct CronExpr {
    /// One schedule, or two when both day fields are restricted (OR rule).
    schedules: Vec<Schedule>,
    tz: Option<Tz>,
}

impl CronExpr {
    pub fn parse(expr: &str, tz: Option<&str>) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(Error::invalid_trigger(format!(
                "cron expression must have exactly 5 fields (minute hour day month weekday), got {}: '{expr}'",
                fields.len()
            )));
        };

        let minutes = parse_field(minute, &MINUTE)?;
        let hours = parse_field(hour, &HOUR)?;
        let doms = parse_field(dom, &DAY_OF_MONTH)?;
        let months = parse_field(month, &MONTH)?;
        let dows: BTreeSet<u32> = parse_field(dow, &DAY_OF_WEEK)?
            .into_iter()
            .map(|d| d % 7)
            .collect();

        let minutes = render(&minutes, &MINUTE);
        let hours = render(&hours, &HOUR);
        let months = render(&months, &MONTH);
        let doms_str = render(&doms, &DAY_OF_MONTH);
        let dows_str = if dows.len() == 7 {
            "*".to_string()
        } else {
            dows.iter()
                .map(|d| WEEKDAY_NAMES[*d as usize])
                .collect::<Vec<_>>()
                .join(",")
        };

        // Classic cron: when both day fields are restricted a day matches if
        // either matches; a field starting with `*` leaves the other in charge.
        let day_pairs = if dom.starts_with('*') || dow.starts_with('*') {
            vec![(doms_str, dows_str)]
        } else {
            vec![(doms_str, "*".to_string()), ("*".to_string(), dows_str)]
        };

        let schedules = day_pairs
            .into_iter()
            .map(|(d, w)| {
                let seven = format!("0 {minutes} {hours} {d} {months} {w} *");
                seven.parse::<Schedule>().map_err(|e| {
                    Error::invalid_trigger(format!("invalid cron expression '{expr}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tz = tz
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| Error::invalid_trigger(format!("unknown timezone: {name}")))
            })
            .transpose()?;

        Ok(Self { schedules, tz })
    }

    /// Soonest matching instant strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|schedule| match self.tz {
                Some(tz) => schedule
                    .after(&now.with_timezone(&tz))
                    .next()
                    .map(|dt| dt.with_timezone(&Utc)),
                None => schedule.after(&now).next(),
            })
            .min()
    }
}

fn parse_value(raw: &str, spec: &FieldSpec) -> Result<u32> {
    let upper = raw.to_ascii_uppercase();
    if let Some(pos) = spec.names.iter().position(|n| *n == upper) {
        return Ok(spec.name_base + pos as u32);
    }
    let value: u32 = raw.parse().map_err(|_| {
        Error::invalid_trigger(format!("invalid {} value '{raw}'", spec.name))
    })?;
    if value < spec.min || value > spec.max {
        return Err(Error::invalid_trigger(format!(
            "{} value {value} out of range {}-{}",
            spec.name, spec.min, spec.max
        )));
    }
    Ok(value)
}

/// Expand one field (`*`, `a`, `a-b`, any of those with `/step`, comma lists).
fn parse_field(raw: &str, spec: &FieldSpec) -> Result<BTreeSet<u32>> {
    let mut values = BTreeSet::new();

    for item in raw.split(',') {
        if item.is_empty() {
            return Err(Error::invalid_trigger(format!(
                "empty list item in {} field '{raw}'",
                spec.name
            )));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    Error::invalid_trigger(format!("invalid step '{step}' in {} field", spec.name))
                })?;
                if step == 0 {
                    return Err(Error::invalid_trigger(format!(
                        "step must be > 0 in {} field",
                        spec.name
                    )));
                }
                (range, Some(step))
            },
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (parse_value(a, spec)?, parse_value(b, spec)?);
            if a > b {
                return Err(Error::invalid_trigger(format!(
                    "range {a}-{b} is reversed in {} field",
                    spec.name
                )));
            }
            (a, b)
        } else {
            let a = parse_value(range, spec)?;
            // `a/step` runs from `a` to the end of the field.
            (a, if step.is_some() { spec.max } else { a })
        };

        values.extend((start..=end).step_by(step.unwrap_or(1) as usize));
    }

    Ok(values)
}

fn render(values: &BTreeSet<u32>, spec: &FieldSpec) -> String {
    if values.len() as u32 == spec.max - spec.min + 1 {
        return "*".into();
    }
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn to_datetime(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or(DateTime::UNIX_EPOCH)
}

impl Trigger {
    /// Next fire time at or after `now_ms`.
    ///
    /// One-time triggers return `fire_at_ms` while it is not in the past and
    /// `None` once it has elapsed; the dispatcher removes a one-time job as
    /// soon as it fires, so a live one-time job has never fired. Cron
    /// triggers return the soonest match strictly after `now_ms`.
    pub fn next_fire_after(&self, now_ms: u64) -> Result<Option<u64>> {
        match self {
            Self::OneTime { fire_at_ms } => Ok((*fire_at_ms >= now_ms).then_some(*fire_at_ms)),
            Self::Cron { expr, tz } => {
                let cron = CronExpr::parse(expr, tz.as_deref())?;
                Ok(cron
                    .next_after(to_datetime(now_ms))
                    .map(|dt| dt.timestamp_millis() as u64))
            },
        }
    }

    /// Up to `count` upcoming fire times after `now_ms`.
    pub fn upcoming(&self, now_ms: u64, count: usize) -> Result<Vec<u64>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = now_ms;
        while out.len() < count {
            let Some(next) = self.next_fire_after(cursor)? else {
                break;
            };
            out.push(next);
            if self.is_one_time() {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    #[must_use]
    pub fn is_one_time(&self) -> bool {
        matches!(self, Self::OneTime { .. })
    }
}

impl TriggerSpec {
    /// Validate client input and resolve it into a [`Trigger`].
    pub fn resolve(&self, now_ms: u64) -> Result<Trigger> {
        match self {
            Self::OneTime {
                delay: None,
                date: None,
            } => Err(Error::invalid_trigger(
                "either delay or date must be provided",
            )),
            Self::OneTime {
                delay: Some(_),
                date: Some(_),
            } => Err(Error::invalid_trigger(
                "only one of delay or date can be provided",
            )),
            Self::OneTime {
                delay: Some(secs),
                date: None,
            } => Ok(Trigger::OneTime {
                fire_at_ms: now_ms.saturating_add(secs.saturating_mul(1000)),
            }),
            Self::OneTime {
                delay: None,
                date: Some(date),
            } => Ok(Trigger::OneTime {
                fire_at_ms: parse_absolute_time_ms(date)?,
            }),
            Self::Cron { cron, tz } => {
                CronExpr::parse(cron, tz.as_deref())?;
                Ok(Trigger::Cron {
                    expr: cron.split_whitespace().collect::<Vec<_>>().join(" "),
                    tz: tz.clone(),
                })
            },
        }
    }
}
