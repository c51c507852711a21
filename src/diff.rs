//! Change detection between an edited grid and its baseline.
//!
//! Target grids are compared row by row on the natural key, cell by cell
//! through [`canonical_cell`]. Market grids support adds and removes, so they
//! are compared as key sets first and only the shared keys are compared on
//! their attribute columns.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::warn;
use serde::Serialize;

use crate::{
    data::{Value, canonical_cell},
    error::FrameError,
    frame::Frame,
};

/// An edited row that differs from its baseline counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedRow {
    pub key: String,
    /// Complete edited row, in [`GridDiff::headers`] order.
    pub values: Vec<Value>,
    pub changed_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridDiff {
    pub headers: Vec<String>,
    pub changed: Vec<ChangedRow>,
    /// Edited keys with no baseline row. Grid edits never add targets, so
    /// these are reported and left alone.
    pub unmatched: Vec<String>,
}

impl GridDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// `baseline` with every row whose key is in `accepted` replaced by its
    /// edited values.
    pub fn merge_into(
        &self,
        baseline: &Frame,
        key_column: &str,
        accepted: &BTreeSet<String>,
    ) -> Result<Frame, FrameError> {
        let key_idx = baseline.require_column(key_column)?;
        let replacements: HashMap<&str, &ChangedRow> = self
            .changed
            .iter()
            .filter(|row| accepted.contains(&row.key))
            .map(|row| (row.key.as_str(), row))
            .collect();
        let positions = self
            .headers
            .iter()
            .map(|h| baseline.require_column(h))
            .collect::<Result<Vec<_>, _>>()?;
        let mut merged = Frame::new(baseline.headers().to_vec());
        for row in baseline.rows() {
            let key = canonical_cell(&row[key_idx]);
            let mut out = row.clone();
            if let Some(changed) = replacements.get(key.as_str()) {
                for (value, &pos) in changed.values.iter().zip(&positions) {
                    out[pos] = value.clone();
                }
            }
            merged.push_row(out)?;
        }
        Ok(merged)
    }
}

/// Diffs `edited` against `baseline` keyed on `key_column`.
///
/// Every baseline column must be present in `edited`; extra edited columns are
/// ignored. A table diffed against itself yields no changes.
pub fn diff_grid(edited: &Frame, baseline: &Frame, key_column: &str) -> Result<GridDiff, FrameError> {
    let base_key = baseline.require_column(key_column)?;
    let edit_key = edited.require_column(key_column)?;
    let positions = baseline
        .headers()
        .iter()
        .map(|h| edited.require_column(h))
        .collect::<Result<Vec<_>, _>>()?;

    let mut baseline_rows: HashMap<String, &[Value]> = HashMap::with_capacity(baseline.len());
    for row in baseline.rows() {
        baseline_rows
            .entry(canonical_cell(&row[base_key]))
            .or_insert(row.as_slice());
    }

    let mut seen = BTreeSet::new();
    let mut changed = Vec::new();
    let mut unmatched = Vec::new();
    for row in edited.rows() {
        let key = canonical_cell(&row[edit_key]);
        if !seen.insert(key.clone()) {
            warn!("Ignoring repeated grid row for '{key}'");
            continue;
        }
        let Some(original) = baseline_rows.get(&key) else {
            unmatched.push(key);
            continue;
        };
        let values: Vec<Value> = positions.iter().map(|&pos| row[pos].clone()).collect();
        let changed_columns: Vec<String> = baseline
            .headers()
            .iter()
            .zip(values.iter().zip(original.iter()))
            .filter(|(_, (new, old))| canonical_cell(new) != canonical_cell(old))
            .map(|(header, _)| header.clone())
            .collect();
        if !changed_columns.is_empty() {
            changed.push(ChangedRow {
                key,
                values,
                changed_columns,
            });
        }
    }

    Ok(GridDiff {
        headers: baseline.headers().to_vec(),
        changed,
        unmatched,
    })
}

pub const MARKET_KEY: &str = "market";
pub const MARKET_GROUP: &str = "market_group";
pub const MARKET_RANK: &str = "rank";
pub const MARKET_NOTES: &str = "notes";

/// One row of the market reference grid. Attribute cells stay raw until the
/// statement builder validates them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRow {
    pub market: String,
    pub market_group: Value,
    pub rank: Value,
    pub notes: Value,
}

impl MarketRow {
    fn same_attributes(&self, other: &MarketRow) -> bool {
        [
            (&self.market_group, &other.market_group),
            (&self.rank, &other.rank),
            (&self.notes, &other.notes),
        ]
        .iter()
        .all(|(a, b)| canonical_cell(a) == canonical_cell(b))
    }
}

pub fn market_headers() -> Vec<String> {
    [MARKET_KEY, MARKET_GROUP, MARKET_RANK, MARKET_NOTES]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

pub fn market_rows(frame: &Frame) -> Result<Vec<MarketRow>, FrameError> {
    let key = frame.require_column(MARKET_KEY)?;
    let group = frame.column_index(MARKET_GROUP);
    let rank = frame.column_index(MARKET_RANK);
    let notes = frame.column_index(MARKET_NOTES);
    let pick = |row: &[Value], idx: Option<usize>| idx.map(|i| row[i].clone()).unwrap_or(Value::Null);
    Ok(frame
        .rows()
        .iter()
        .map(|row| MarketRow {
            market: canonical_cell(&row[key]),
            market_group: pick(row, group),
            rank: pick(row, rank),
            notes: pick(row, notes),
        })
        .collect())
}

pub fn market_frame(rows: &[MarketRow]) -> Frame {
    let mut frame = Frame::new(market_headers());
    for row in rows {
        let _ = frame.push_row(vec![
            Value::text(&row.market),
            row.market_group.clone(),
            row.rank.clone(),
            row.notes.clone(),
        ]);
    }
    frame
}

/// Each key lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketDiff {
    pub new: Vec<MarketRow>,
    pub deleted: Vec<String>,
    pub changed: Vec<MarketRow>,
    pub unchanged: Vec<String>,
}

impl MarketDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty() && self.changed.is_empty()
    }
}

pub fn diff_markets(edited: &[MarketRow], baseline: &[MarketRow]) -> MarketDiff {
    let edited_by_key = first_by_key(edited);
    let baseline_by_key = first_by_key(baseline);
    let edited_keys: BTreeSet<&str> = edited_by_key.keys().copied().collect();
    let baseline_keys: BTreeSet<&str> = baseline_by_key.keys().copied().collect();

    let mut diff = MarketDiff::default();
    for key in edited_keys.difference(&baseline_keys) {
        diff.new.push(edited_by_key[key].clone());
    }
    for key in baseline_keys.difference(&edited_keys) {
        diff.deleted.push(key.to_string());
    }
    for key in edited_keys.intersection(&baseline_keys) {
        let edited_row = edited_by_key[key];
        if edited_row.same_attributes(baseline_by_key[key]) {
            diff.unchanged.push(key.to_string());
        } else {
            diff.changed.push(edited_row.clone());
        }
    }
    diff
}

fn first_by_key(rows: &[MarketRow]) -> BTreeMap<&str, &MarketRow> {
    let mut map = BTreeMap::new();
    for row in rows {
        map.entry(row.market.as_str()).or_insert(row);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(rows: Vec<(&str, Value)>) -> Frame {
        Frame::from_rows(
            vec!["name".into(), "goal".into()],
            rows.into_iter()
                .map(|(name, goal)| vec![Value::text(name), goal])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn whitespace_and_type_differences_are_not_changes() {
        let baseline = grid(vec![("A", Value::Integer(5))]);
        let edited = grid(vec![("A", Value::text("5 "))]);
        let diff = diff_grid(&edited, &baseline, "name").unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn changed_row_carries_full_edited_values() {
        let baseline = grid(vec![("A", Value::Integer(5)), ("B", Value::Integer(1))]);
        let edited = grid(vec![("A", Value::Integer(6)), ("B", Value::Integer(1))]);
        let diff = diff_grid(&edited, &baseline, "name").unwrap();
        assert_eq!(
            diff.changed,
            vec![ChangedRow {
                key: "A".into(),
                values: vec![Value::text("A"), Value::Integer(6)],
                changed_columns: vec!["goal".into()],
            }]
        );
    }

    #[test]
    fn edited_rows_follow_baseline_column_order() {
        let baseline = grid(vec![("A", Value::Integer(5))]);
        let edited = Frame::from_rows(
            vec!["GOAL".into(), "NAME".into(), "extra".into()],
            vec![vec![Value::text("7"), Value::text("A"), Value::Null]],
        )
        .unwrap();
        let diff = diff_grid(&edited, &baseline, "name").unwrap();
        assert_eq!(diff.changed[0].values, vec![Value::text("A"), Value::text("7")]);
    }

    #[test]
    fn rows_without_baseline_are_unmatched() {
        let baseline = grid(vec![("A", Value::Integer(5))]);
        let edited = grid(vec![("A", Value::Integer(5)), ("New", Value::Integer(1))]);
        let diff = diff_grid(&edited, &baseline, "name").unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.unmatched, vec!["New".to_string()]);
    }

    #[test]
    fn missing_columns_are_structural_errors() {
        let baseline = grid(vec![("A", Value::Integer(5))]);
        let edited = Frame::from_rows(vec!["name".into()], vec![vec![Value::text("A")]]).unwrap();
        assert_eq!(
            diff_grid(&edited, &baseline, "name"),
            Err(FrameError::MissingColumn("goal".into()))
        );
        assert!(diff_grid(&baseline, &baseline, "closer").is_err());
    }

    #[test]
    fn merge_into_applies_only_accepted_rows() {
        let baseline = grid(vec![("A", Value::Integer(5)), ("B", Value::Integer(1))]);
        let edited = grid(vec![("A", Value::Integer(6)), ("B", Value::Integer(2))]);
        let diff = diff_grid(&edited, &baseline, "name").unwrap();
        let accepted = BTreeSet::from(["B".to_string()]);
        let merged = diff.merge_into(&baseline, "name", &accepted).unwrap();
        assert_eq!(
            merged.rows(),
            &[
                vec![Value::text("A"), Value::Integer(5)],
                vec![Value::text("B"), Value::Integer(2)],
            ]
        );
    }

    fn market(key: &str, group: &str) -> MarketRow {
        MarketRow {
            market: key.into(),
            market_group: Value::text(group),
            rank: Value::Null,
            notes: Value::Null,
        }
    }

    #[test]
    fn market_keys_split_into_new_deleted_and_common() {
        let baseline = vec![market("X", "g1"), market("Y", "g1")];
        let edited = vec![market("Y", "g1"), market("Z", "g2")];
        let diff = diff_markets(&edited, &baseline);
        assert_eq!(diff.new, vec![market("Z", "g2")]);
        assert_eq!(diff.deleted, vec!["X".to_string()]);
        assert!(diff.changed.is_empty());
        assert_eq!(diff.unchanged, vec!["Y".to_string()]);
    }

    #[test]
    fn common_market_compares_attributes_only() {
        let baseline = vec![MarketRow {
            rank: Value::Integer(2),
            ..market("Y", "g1")
        }];
        let same = vec![MarketRow {
            rank: Value::text(" 2"),
            ..market("Y", "g1")
        }];
        assert!(diff_markets(&same, &baseline).is_empty());
        let regrouped = vec![MarketRow {
            rank: Value::Integer(2),
            ..market("Y", "g2")
        }];
        assert_eq!(diff_markets(&regrouped, &baseline).changed.len(), 1);
    }

    fn cell() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            (-50i64..50).prop_map(Value::Integer),
            "[a-z ]{0,5}".prop_map(Value::Text),
        ]
    }

    proptest! {
        #[test]
        fn diff_of_a_table_with_itself_is_empty(
            rows in proptest::collection::vec((("[A-Z]{1,3}"), cell(), cell()), 0..20)
        ) {
            let frame = Frame::from_rows(
                vec!["name".into(), "goal".into(), "notes".into()],
                rows.into_iter()
                    .map(|(name, goal, notes)| vec![Value::Text(name), goal, notes])
                    .collect(),
            )
            .unwrap();
            let diff = diff_grid(&frame, &frame, "name").unwrap();
            prop_assert!(diff.is_empty());
            prop_assert!(diff.unmatched.is_empty());
        }
    }
}
