//! Closer target grid: export, selector options, and syncing edits back.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::{info, warn};
use serde::Serialize;

use crate::{
    Desk,
    cli::{ExportArgs, GridApplyArgs, SelectionArgs},
    data::Value,
    diff::{GridDiff, diff_grid},
    error::FrameError,
    filter::{self, FilterOutcome},
    frame::Frame,
    io_utils,
    normalize::{self, Vocabulary},
    session::Session,
    source::DataSource,
    statement::StatementBuilder,
    table,
    write::{self, ApplyOutcome, PlannedWrite},
};

/// What syncing one edited grid produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSync {
    pub diff: GridDiff,
    pub outcome: ApplyOutcome,
}

/// Runs the filter pipeline over the session snapshot.
pub fn filtered_records(
    session: &mut Session,
    source: &mut dyn DataSource,
    selection: &SelectionArgs,
) -> Result<FilterOutcome> {
    let records = session.records(source)?;
    let selections = filter::default_selections(
        selection.market.as_deref(),
        selection.closer.as_deref(),
        selection.channel.as_deref(),
    );
    Ok(filter::run_pipeline(&records, &selections))
}

/// Diffs `edited` against `baseline` and plans one upsert per changed row.
pub fn plan_targets(
    session: &mut Session,
    source: &mut dyn DataSource,
    edited: &Frame,
    baseline: &Frame,
    now: NaiveDateTime,
) -> Result<(GridDiff, Vec<PlannedWrite>)> {
    require_target_columns(baseline).context("Checking target grid")?;
    let diff = diff_grid(edited, baseline, normalize::NAME).context("Comparing target grids")?;
    for key in &diff.unmatched {
        warn!("'{key}' is not in the baseline grid; use `add` to create closers");
    }
    let vocabulary = session.vocabulary(source)?;
    let builder = StatementBuilder::new(&session.config.tables, &vocabulary, now);
    let planned = diff
        .changed
        .iter()
        .map(|row| PlannedWrite {
            key: row.key.clone(),
            statement: builder.upsert_target(&diff.headers, row),
            record: edited_record(&diff.headers, &row.values, &vocabulary),
        })
        .collect();
    Ok((diff, planned))
}

/// Upserts bind every target column, so a grid must carry all of them. The
/// external id is never updated and may be left out.
fn require_target_columns(grid: &Frame) -> Result<(), FrameError> {
    match normalize::RECORD_COLUMNS
        .iter()
        .filter(|column| **column != normalize::EXTERNAL_ID)
        .find(|column| normalize::locate_column(grid, column).is_none())
    {
        Some(missing) => Err(FrameError::MissingColumn(missing.to_string())),
        None => Ok(()),
    }
}

fn edited_record(
    headers: &[String],
    values: &[Value],
    vocabulary: &Vocabulary,
) -> Option<normalize::Record> {
    let frame = Frame::from_rows(headers.to_vec(), vec![values.to_vec()]).ok()?;
    normalize::normalize_frame(&frame, vocabulary)
        .ok()?
        .into_iter()
        .next()
}

/// Diffs, writes the changed rows, and refreshes the session.
pub fn reconcile_targets(
    session: &mut Session,
    source: &mut dyn DataSource,
    edited: &Frame,
    baseline: &Frame,
    now: NaiveDateTime,
) -> Result<TargetSync> {
    let (diff, planned) = plan_targets(session, source, edited, baseline, now)?;
    if planned.is_empty() {
        return Ok(TargetSync {
            diff,
            outcome: ApplyOutcome::NoChanges,
        });
    }
    let report = write::execute_batch(session, source, planned);
    Ok(TargetSync {
        diff,
        outcome: ApplyOutcome::Applied(report),
    })
}

pub fn execute_export(desk: &mut Desk, args: &ExportArgs) -> Result<()> {
    let outcome = filtered_records(&mut desk.session, &mut desk.source, &args.selection)?;
    let frame = normalize::records_to_frame(&outcome.rows);
    if args.table {
        print!("{}", table::render_frame(&frame));
    } else {
        let delimiter = args
            .output
            .as_deref()
            .map(|p| io_utils::resolve_delimiter(p, args.delimiter))
            .unwrap_or(args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER));
        io_utils::write_frame(args.output.as_deref(), &frame, delimiter)?;
        info!(
            "Exported {} of {} record(s) to {} (delimiter '{}')",
            outcome.rows.len(),
            desk.session.snapshot.current().len(),
            destination(args.output.as_deref()),
            crate::printable_delimiter(delimiter)
        );
    }
    Ok(())
}

pub fn execute_options(desk: &mut Desk, args: &SelectionArgs) -> Result<()> {
    let outcome = filtered_records(&mut desk.session, &mut desk.source, args)?;
    for stage in &outcome.stages {
        println!("{}: {}", stage.field, stage.options.join(" | "));
    }
    Ok(())
}

pub fn execute_apply(desk: &mut Desk, args: &GridApplyArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_delimiter(&args.baseline, args.delimiter);
    let baseline = io_utils::read_frame(&args.baseline, delimiter, encoding)
        .with_context(|| format!("Loading baseline grid {:?}", args.baseline))?;
    let edited = io_utils::read_frame(&args.edited, delimiter, encoding)
        .with_context(|| format!("Loading edited grid {:?}", args.edited))?;
    let now = Local::now().naive_local();

    if args.dry_run {
        let (_, planned) =
            plan_targets(&mut desk.session, &mut desk.source, &edited, &baseline, now)?;
        print_plan(&planned);
        return Ok(());
    }

    desk.session.records(&mut desk.source)?;
    let sync = reconcile_targets(&mut desk.session, &mut desk.source, &edited, &baseline, now)?;
    report_outcome(&sync.outcome);
    if let Some(path) = &args.report {
        write_json_report(path, &sync)?;
    }
    if args.write_baseline
        && let Some(report) = sync.outcome.report()
    {
        let merged = sync
            .diff
            .merge_into(&baseline, normalize::NAME, &report.accepted_keys())?;
        io_utils::write_frame(Some(&args.baseline), &merged, delimiter)?;
        info!("Baseline {:?} updated", args.baseline);
    }
    Ok(())
}

pub(crate) fn print_plan(planned: &[PlannedWrite]) {
    if planned.is_empty() {
        println!("No changes detected.");
        return;
    }
    for write in planned {
        match &write.statement {
            Ok(statement) => println!("{};", statement.render_inline()),
            Err(err) => println!("-- skipped {}: {err}", write.key),
        }
    }
}

pub(crate) fn report_outcome(outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::NoChanges => println!("No changes detected."),
        ApplyOutcome::Applied(report) => {
            let headers = vec![
                "key".to_string(),
                "status".to_string(),
                "message".to_string(),
            ];
            table::print_table(&headers, &report.table_rows());
        }
    }
}

pub(crate) fn write_json_report<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("Creating report {path:?}"))?;
    serde_json::to_writer_pretty(file, value).context("Writing JSON report")
}

fn destination(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string())
}
