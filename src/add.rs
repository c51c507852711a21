//! The add-closer form.
//!
//! Targets are never created from the grid. A new closer is added here, one at
//! a time, and must be a current closer or manager in the users table. Their
//! profile picture and external id come from the same table.

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use itertools::Itertools;

use crate::{
    Desk,
    cli::AddArgs,
    data::Value,
    error::RowError,
    frame::Frame,
    normalize::{self, Record},
    session::Session,
    source::{self, DataSource},
    statement::StatementBuilder,
    targets::report_outcome,
    write::{self, ApplyOutcome, BatchReport, PlannedWrite},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCloser {
    pub name: String,
    pub market: String,
    pub channel_type: String,
    pub goal: i64,
    pub rank: i64,
    pub secondary_goal: i64,
    pub secondary_rank: i64,
    pub active: bool,
    pub notes: String,
}

/// Sorted distinct names of current closers and managers.
pub fn closer_options(session: &mut Session, source: &mut dyn DataSource) -> Result<Vec<String>> {
    let query = source::active_users_query(&session.config.tables);
    let users = session
        .reads
        .get_or_read(source, &query)
        .context("Reading users")?;
    let idx = users.require_column("full_name")?;
    Ok(users
        .rows()
        .iter()
        .map(|row| row[idx].as_display().trim().to_string())
        .filter(|name| !name.is_empty())
        .sorted()
        .dedup()
        .collect())
}

struct Profile {
    image_url: String,
    external_id: String,
}

fn lookup_profile(users: &Frame, name: &str) -> Result<Option<Profile>> {
    let name_idx = users.require_column("full_name")?;
    let picture_idx = users.column_index("profile_picture");
    let id_idx = users.column_index("external_id");
    let text = |row: &[Value], idx: Option<usize>| {
        idx.map(|i| row[i].as_display().trim().to_string())
            .unwrap_or_default()
    };
    Ok(users
        .rows()
        .iter()
        .find(|row| row[name_idx].as_display().trim() == name)
        .map(|row| Profile {
            image_url: text(row.as_slice(), picture_idx),
            external_id: text(row.as_slice(), id_idx),
        }))
}

/// Validates the form and inserts the closer. The returned report has exactly
/// one row.
pub fn add_closer(
    session: &mut Session,
    source: &mut dyn DataSource,
    form: &AddCloser,
    now: NaiveDateTime,
) -> Result<BatchReport> {
    let name = form.name.trim().to_string();
    let vocabulary = session.vocabulary(source)?;
    let closers = closer_options(session, source)?;
    let profiles_query = source::profiles_query(&session.config.tables);
    let profile = {
        let users = session
            .reads
            .get_or_read(source, &profiles_query)
            .context("Reading user profiles")?;
        lookup_profile(users, &name)?
    };

    let record = Record {
        name: name.clone(),
        market: form.market.trim().to_string(),
        channel_type: form.channel_type.trim().to_string(),
        active: form.active,
        goal: form.goal,
        rank: form.rank,
        secondary_goal: form.secondary_goal,
        secondary_rank: form.secondary_rank,
        notes: form.notes.clone(),
        external_id: profile
            .as_ref()
            .map(|p| p.external_id.clone())
            .unwrap_or_default(),
        image_url: profile
            .map(|p| p.image_url)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| vocabulary.placeholder_image.clone()),
    };

    let builder = StatementBuilder::new(&session.config.tables, &vocabulary, now);
    let statement = if !name.is_empty() && !closers.contains(&name) {
        Err(RowError::NotAllowed {
            column: normalize::NAME.to_string(),
            value: name.clone(),
        })
    } else {
        builder.insert_target(&record)
    };
    let planned = PlannedWrite {
        key: if name.is_empty() { form.name.clone() } else { name },
        statement,
        record: Some(record),
    };
    Ok(write::execute_batch(session, source, vec![planned]))
}

pub fn execute(desk: &mut Desk, args: &AddArgs) -> Result<()> {
    let form = AddCloser {
        name: args.name.clone(),
        market: args.market.clone(),
        channel_type: args
            .channel
            .clone()
            .unwrap_or_else(|| desk.session.config.default_channel_type.clone()),
        goal: args.goal,
        rank: args.rank,
        secondary_goal: args.secondary_goal,
        secondary_rank: args.secondary_rank,
        active: !args.inactive,
        notes: args.notes.clone(),
    };
    let report = add_closer(
        &mut desk.session,
        &mut desk.source,
        &form,
        Local::now().naive_local(),
    )?;
    report_outcome(&ApplyOutcome::Applied(report.clone()));
    if report.failed() > 0 {
        bail!("{} was not added", form.name.trim());
    }
    Ok(())
}
