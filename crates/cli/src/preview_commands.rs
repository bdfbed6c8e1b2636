use {
    anyhow::Result,
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    clap::Args,
    tocsin_scheduler::{
        clock::{Clock, SystemClock},
        types::TriggerSpec,
    },
};

#[derive(Args)]
pub struct PreviewArgs {
    /// Five-field cron expression, e.g. "*/5 * * * *".
    pub expr: String,
    /// Number of fire times to print.
    #[arg(short = 'n', long, default_value_t = 5)]
    pub count: usize,
    /// IANA time zone the expression is evaluated in (default UTC).
    #[arg(long)]
    pub tz: Option<String>,
}

pub fn handle_preview(args: &PreviewArgs) -> Result<()> {
    let lines = preview_lines(args, SystemClock.now_ms())?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn preview_lines(args: &PreviewArgs, now_ms: u64) -> Result<Vec<String>> {
    let trigger = TriggerSpec::Cron {
        cron: args.expr.clone(),
        tz: args.tz.clone(),
    }
    .resolve(now_ms)?;
    let tz: Option<Tz> = args.tz.as_deref().and_then(|name| name.parse().ok());

    let times = trigger.upcoming(now_ms, args.count)?;
    if times.is_empty() {
        anyhow::bail!("'{}' never fires", args.expr);
    }

    Ok(times
        .into_iter()
        .filter_map(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .map(|utc| match tz {
            Some(tz) => format!(
                "{}  ({})",
                utc.format("%Y-%m-%dT%H:%M:%SZ"),
                utc.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z")
            ),
            None => utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        })
        .collect())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const NOON: u64 = 1_706_788_800_000; // 2024-02-01T12:00:00Z

    fn args(expr: &str, count: usize, tz: Option<&str>) -> PreviewArgs {
        PreviewArgs {
            expr: expr.into(),
            count,
            tz: tz.map(String::from),
        }
    }

    #[test]
    fn lists_upcoming_times() {
        let lines = preview_lines(&args("*/5 * * * *", 2, None), NOON).unwrap();
        assert_eq!(lines, vec!["2024-02-01T12:05:00Z", "2024-02-01T12:10:00Z"]);
    }

    #[test]
    fn shows_local_time_for_zone() {
        let lines = preview_lines(&args("0 9 * * *", 1, Some("Europe/Paris")), NOON).unwrap();
        assert_eq!(lines, vec!["2024-02-02T08:00:00Z  (2024-02-02 09:00 CET)"]);
    }

    #[test]
    fn rejects_bad_expression() {
        assert!(preview_lines(&args("* * *", 3, None), NOON).is_err());
        assert!(preview_lines(&args("0 0 30 2 *", 3, None), NOON).is_err());
    }
}
