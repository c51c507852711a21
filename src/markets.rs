//! Market reference grid with full add/edit/remove support.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::info;
use serde::Serialize;

use crate::{
    Desk,
    cli::{GridApplyArgs, MarketExportArgs},
    diff::{MarketDiff, diff_markets, market_frame, market_rows},
    frame::Frame,
    io_utils,
    session::Session,
    source::DataSource,
    statement::StatementBuilder,
    table,
    targets::{print_plan, report_outcome, write_json_report},
    write::{self, ApplyOutcome, PlannedWrite},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSync {
    pub diff: MarketDiff,
    pub outcome: ApplyOutcome,
}

/// Plans deletes, then inserts, then updates.
pub fn plan_markets(
    session: &mut Session,
    source: &mut dyn DataSource,
    edited: &Frame,
    baseline: &Frame,
    now: NaiveDateTime,
) -> Result<(MarketDiff, Vec<PlannedWrite>)> {
    let edited_rows = market_rows(edited).context("Reading edited market grid")?;
    let baseline_rows = market_rows(baseline).context("Reading baseline market grid")?;
    let diff = diff_markets(&edited_rows, &baseline_rows);

    let vocabulary = session.vocabulary(source)?;
    let builder = StatementBuilder::new(&session.config.tables, &vocabulary, now);
    let mut planned = Vec::with_capacity(diff.new.len() + diff.deleted.len() + diff.changed.len());
    for market in &diff.deleted {
        planned.push(PlannedWrite {
            key: market.clone(),
            statement: Ok(builder.delete_market(market)),
            record: None,
        });
    }
    for row in &diff.new {
        planned.push(PlannedWrite {
            key: row.market.clone(),
            statement: builder.insert_market(row),
            record: None,
        });
    }
    for row in &diff.changed {
        planned.push(PlannedWrite {
            key: row.market.clone(),
            statement: builder.update_market(row),
            record: None,
        });
    }
    Ok((diff, planned))
}

pub fn reconcile_markets(
    session: &mut Session,
    source: &mut dyn DataSource,
    edited: &Frame,
    baseline: &Frame,
    now: NaiveDateTime,
) -> Result<MarketSync> {
    let (diff, planned) = plan_markets(session, source, edited, baseline, now)?;
    let outcome = if planned.is_empty() {
        ApplyOutcome::NoChanges
    } else {
        ApplyOutcome::Applied(write::execute_batch(session, source, planned))
    };
    Ok(MarketSync { diff, outcome })
}

pub fn execute_export(desk: &mut Desk, args: &MarketExportArgs) -> Result<()> {
    let markets = desk.session.markets(&mut desk.source)?;
    let frame = market_frame(&market_rows(&markets)?);
    if args.table {
        print!("{}", table::render_frame(&frame));
        return Ok(());
    }
    let delimiter = args
        .output
        .as_deref()
        .map(|p| io_utils::resolve_delimiter(p, args.delimiter))
        .unwrap_or(args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER));
    io_utils::write_frame(args.output.as_deref(), &frame, delimiter)?;
    info!("Exported {} market(s)", frame.len());
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
            plan_markets(&mut desk.session, &mut desk.source, &edited, &baseline, now)?;
        print_plan(&planned);
        return Ok(());
    }

    let sync = reconcile_markets(&mut desk.session, &mut desk.source, &edited, &baseline, now)?;
    report_outcome(&sync.outcome);
    if let Some(path) = &args.report {
        write_json_report(path, &sync)?;
    }
    if args.write_baseline && sync.outcome.report().is_some() {
        // The key set may have changed; refetch.
        let fresh = desk.session.markets(&mut desk.source)?;
        io_utils::write_frame(
            Some(&args.baseline),
            &market_frame(&market_rows(&fresh)?),
            delimiter,
        )?;
        info!("Baseline {:?} refreshed from the warehouse", args.baseline);
    }
    Ok(())
}
