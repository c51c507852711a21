//! Chained equality filters over the snapshot.
//!
//! Stages run left to right. The option list for each stage's selector is
//! built from the rows that survived the stages before it, so a later
//! selector never offers a value that earlier selections already excluded.

use std::fmt;

use itertools::Itertools;

use crate::normalize::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Market,
    Closer,
    Channel,
}

impl FilterField {
    /// Order the dashboard presents its selectors in.
    pub const DEFAULT_ORDER: [FilterField; 3] =
        [FilterField::Market, FilterField::Closer, FilterField::Channel];

    /// Sentinel that selects every row; always the first option.
    pub fn all_token(self) -> &'static str {
        match self {
            FilterField::Market => "All Markets",
            FilterField::Closer => "All Closers",
            FilterField::Channel => "All Channels",
        }
    }

    pub fn value_of(self, record: &Record) -> &str {
        match self {
            FilterField::Market => &record.market,
            FilterField::Closer => &record.name,
            FilterField::Channel => &record.channel_type,
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FilterField::Market => "market",
            FilterField::Closer => "closer",
            FilterField::Channel => "channel",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub field: FilterField,
    pub value: Option<String>,
}

impl Selection {
    pub fn all(field: FilterField) -> Self {
        Self { field, value: None }
    }

    /// A selection equal to the field's "All" token passes everything.
    pub fn new(field: FilterField, value: impl Into<String>) -> Self {
        let value = value.into();
        if value == field.all_token() {
            Self::all(field)
        } else {
            Self {
                field,
                value: Some(value),
            }
        }
    }

    fn matches(&self, record: &Record) -> bool {
        match &self.value {
            None => true,
            Some(value) => self.field.value_of(record) == value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions {
    pub field: FilterField,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub stages: Vec<StageOptions>,
    pub rows: Vec<Record>,
}

impl FilterOutcome {
    pub fn options_for(&self, field: FilterField) -> Option<&[String]> {
        self.stages
            .iter()
            .find(|stage| stage.field == field)
            .map(|stage| stage.options.as_slice())
    }
}

/// Options for `field` drawn from `rows`: the "All" token, then distinct values
/// in ascending byte order.
pub fn option_list(field: FilterField, rows: &[Record]) -> Vec<String> {
    std::iter::once(field.all_token().to_string())
        .chain(
            rows.iter()
                .map(|record| field.value_of(record))
                .sorted()
                .dedup()
                .map(str::to_string),
        )
        .collect()
}

/// Runs `selections` in order over `records`. The result is sorted by name.
pub fn run_pipeline(records: &[Record], selections: &[Selection]) -> FilterOutcome {
    let mut current: Vec<Record> = records.to_vec();
    let mut stages = Vec::with_capacity(selections.len());
    for selection in selections {
        stages.push(StageOptions {
            field: selection.field,
            options: option_list(selection.field, &current),
        });
        current.retain(|record| selection.matches(record));
    }
    current.sort_by(|a, b| a.name.cmp(&b.name));
    FilterOutcome {
        stages,
        rows: current,
    }
}

/// Builds the dashboard's market, closer, channel selections, with `None`
/// meaning "All".
pub fn default_selections(
    market: Option<&str>,
    closer: Option<&str>,
    channel: Option<&str>,
) -> Vec<Selection> {
    FilterField::DEFAULT_ORDER
        .iter()
        .zip([market, closer, channel])
        .map(|(field, value)| match value {
            Some(v) => Selection::new(*field, v),
            None => Selection::all(*field),
        })
        .collect()
}
