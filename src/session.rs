//! Session-scoped state: the editing snapshot and cached reference reads.
//!
//! A [`Session`] is created when a user session starts and handed by `&mut`
//! to every operation that reads or writes. Nothing here is shared between
//! sessions.

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::debug;

use crate::{
    config::Config,
    frame::Frame,
    normalize::{self, Record, Vocabulary},
    source::{self, DataSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Empty,
    Fresh,
    /// A write batch completed since the last fetch. The records still hold
    /// the merged edits for display, but the next load refetches.
    Stale,
}

/// The last fetched and normalized target records, the editing baseline.
#[derive(Debug)]
pub struct SnapshotStore {
    records: Vec<Record>,
    state: SnapshotState,
    fetches: usize,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            state: SnapshotState::Empty,
            fetches: 0,
        }
    }
}

impl SnapshotStore {
    pub fn state(&self) -> SnapshotState {
        self.state
    }

    /// Number of warehouse fetches made so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Whatever the snapshot currently holds, fresh or not.
    pub fn current(&self) -> &[Record] {
        &self.records
    }

    /// Returns the snapshot, fetching and normalizing it first unless fresh.
    pub fn load(
        &mut self,
        source: &mut dyn DataSource,
        config: &Config,
        vocabulary: &Vocabulary,
    ) -> Result<&[Record]> {
        if self.state != SnapshotState::Fresh {
            let frame = source
                .read(&source::targets_query(&config.tables))
                .context("Reading closer targets")?;
            self.records = normalize::normalize_frame(&frame, vocabulary)?;
            self.state = SnapshotState::Fresh;
            self.fetches += 1;
            debug!("Fetched snapshot of {} record(s)", self.records.len());
        }
        Ok(&self.records)
    }

    pub fn invalidate(&mut self) {
        if self.state == SnapshotState::Fresh {
            self.state = SnapshotState::Stale;
        }
    }

    /// Replaces records by name with `edits`, appending names not yet present.
    pub fn merge(&mut self, edits: impl IntoIterator<Item = Record>) {
        for edit in edits {
            match self.records.iter_mut().find(|r| r.name == edit.name) {
                Some(existing) => *existing = edit,
                None => self.records.push(edit),
            }
        }
    }
}

/// Reference reads keyed by their query text.
#[derive(Debug, Default)]
pub struct ReadCache {
    frames: HashMap<String, Frame>,
}

impl ReadCache {
    pub fn get_or_read(&mut self, source: &mut dyn DataSource, query: &str) -> Result<&Frame> {
        if !self.frames.contains_key(query) {
            let frame = source.read(query)?;
            self.frames.insert(query.to_string(), frame);
        }
        Ok(&self.frames[query])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[derive(Debug)]
pub struct Session {
    pub config: Config,
    pub snapshot: SnapshotStore,
    pub reads: ReadCache,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            snapshot: SnapshotStore::default(),
            reads: ReadCache::default(),
        }
    }

    /// The market reference table, cached.
    pub fn markets(&mut self, source: &mut dyn DataSource) -> Result<Frame> {
        let query = source::markets_query(&self.config.tables);
        self.reads
            .get_or_read(source, &query)
            .cloned()
            .context("Reading markets")
    }

    /// Vocabulary built from the configured channel types and the cached
    /// market reference table.
    pub fn vocabulary(&mut self, source: &mut dyn DataSource) -> Result<Vocabulary> {
        let markets = self.markets(source)?;
        let names = Vocabulary::market_names(&markets)?;
        Ok(Vocabulary::new(&self.config, names))
    }

    /// Snapshot records, refetched if stale.
    pub fn records(&mut self, source: &mut dyn DataSource) -> Result<Vec<Record>> {
        let vocabulary = self.vocabulary(source)?;
        Ok(self
            .snapshot
            .load(source, &self.config, &vocabulary)?
            .to_vec())
    }

    /// Marks the snapshot stale and drops cached reference reads.
    pub fn invalidate(&mut self) {
        self.snapshot.invalidate();
        self.reads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        source::SqliteSource,
    };

    fn source_with_targets() -> (SqliteSource, Config) {
        let config = Config::default();
        let mut source = SqliteSource::open_in_memory().unwrap();
        source.init_schema(&config.tables).unwrap();
        let targets = Frame::from_rows(
            vec!["name".into(), "market".into(), "goal".into()],
            vec![vec![Value::text("Ana"), Value::text("West"), Value::Integer(5)]],
        )
        .unwrap();
        source.insert_frame(&config.tables.targets, &targets).unwrap();
        let markets =
            Frame::from_rows(vec!["market".into()], vec![vec![Value::text("West")]]).unwrap();
        source.insert_frame(&config.tables.markets, &markets).unwrap();
        (source, config)
    }

    #[test]
    fn snapshot_fetches_once_until_invalidated() {
        let (mut source, config) = source_with_targets();
        let mut session = Session::new(config);
        let records = session.records(&mut source).unwrap();
        assert_eq!(records[0].market, "West");
        assert_eq!(records[0].goal, 5);
        session.records(&mut source).unwrap();
        assert_eq!(session.snapshot.fetches(), 1);
        assert_eq!(session.reads.len(), 1);

        session.invalidate();
        assert_eq!(session.snapshot.state(), SnapshotState::Stale);
        assert!(session.reads.is_empty());
        session.records(&mut source).unwrap();
        assert_eq!(session.snapshot.fetches(), 2);
        assert_eq!(session.snapshot.state(), SnapshotState::Fresh);
    }

    #[test]
    fn merge_replaces_by_name() {
        let (mut source, config) = source_with_targets();
        let mut session = Session::new(config);
        let mut edited = session.records(&mut source).unwrap()[0].clone();
        edited.goal = 9;
        session.snapshot.merge([edited]);
        assert_eq!(session.snapshot.current().len(), 1);
        assert_eq!(session.snapshot.current()[0].goal, 9);
    }
}
