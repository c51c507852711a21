//! Weekly goal progress: appointments set per closer against their goal.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Datelike, Days, Local, NaiveDate, NaiveDateTime};
use log::debug;
use serde::Serialize;

use crate::{
    Desk,
    cli::ProgressArgs,
    data::Value,
    frame::Frame,
    normalize::Record,
    source,
    table,
};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub name: String,
    pub market: String,
    pub goal: i64,
    pub appointments: usize,
    /// `None` when the goal is zero.
    pub ratio: Option<f64>,
}

/// Monday and Sunday of the ISO week containing `day`.
pub fn week_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = u64::from(day.weekday().num_days_from_monday());
    let start = day - Days::new(offset);
    (start, start + Days::new(6))
}

fn parse_day(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_display();
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}

/// Counts appointments in the week of `week_of` for each closer with an
/// external id. Rows with an unreadable timestamp are skipped.
pub fn compute_progress(
    records: &[Record],
    appointments: &Frame,
    week_of: NaiveDate,
    include_inactive: bool,
) -> Result<Vec<GoalProgress>> {
    let closer_idx = appointments.require_column("closer_id")?;
    let when_idx = appointments.require_column("scheduled_at")?;
    let (start, end) = week_bounds(week_of);

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;
    for row in appointments.rows() {
        let Some(day) = parse_day(&row[when_idx]) else {
            skipped += 1;
            continue;
        };
        if day < start || day > end {
            continue;
        }
        let closer = row[closer_idx].as_display().trim().to_string();
        if !closer.is_empty() {
            *counts.entry(closer).or_default() += 1;
        }
    }
    if skipped > 0 {
        debug!("Skipped {skipped} appointment(s) without a readable date");
    }

    let mut progress = records
        .iter()
        .filter(|r| include_inactive || r.active)
        .map(|r| {
            let id = r.external_id.trim();
            let appointments = if id.is_empty() {
                0
            } else {
                counts.get(id).copied().unwrap_or(0)
            };
            GoalProgress {
                name: r.name.clone(),
                market: r.market.clone(),
                goal: r.goal,
                appointments,
                ratio: (r.goal > 0).then(|| appointments as f64 / r.goal as f64),
            }
        })
        .collect::<Vec<_>>();
    progress.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(progress)
}

pub fn execute(desk: &mut Desk, args: &ProgressArgs) -> Result<()> {
    let week_of = args.week_of.unwrap_or_else(|| Local::now().date_naive());
    let records = desk.session.records(&mut desk.source)?;
    let query = source::appointments_query(&desk.session.config.tables);
    let appointments = desk
        .session
        .reads
        .get_or_read(&mut desk.source, &query)
        .context("Reading appointments")?;
    let progress = compute_progress(&records, appointments, week_of, args.all)?;

    let (start, end) = week_bounds(week_of);
    println!("Week of {start} to {end}");
    let headers = ["name", "market", "goal", "set", "progress"]
        .map(String::from)
        .to_vec();
    let rows = progress
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.market.clone(),
                p.goal.to_string(),
                p.appointments.to_string(),
                p.ratio
                    .map(|r| format!("{:.0}%", r * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}
