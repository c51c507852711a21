//! Record normalization.
//!
//! Turns a raw warehouse read (or an edited grid) into canonical [`Record`]s.
//! Normalization is total: missing columns and cells take their defaults and
//! out-of-vocabulary enum values are coerced, never rejected. The only hard
//! failure is a frame with no name column at all.
//!
//! Columns are matched by their canonical name first and then by the legacy
//! warehouse spellings (`FULL_NAME`, `TYPE`, `FM_GOAL`, `CLOSER_NOTES`, ...).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    data::{Value, parse_flag},
    error::FrameError,
    frame::Frame,
};

pub const NAME: &str = "name";
pub const MARKET: &str = "market";
pub const CHANNEL_TYPE: &str = "channel_type";
pub const ACTIVE: &str = "active";
pub const GOAL: &str = "goal";
pub const RANK: &str = "rank";
pub const SECONDARY_GOAL: &str = "secondary_goal";
pub const SECONDARY_RANK: &str = "secondary_rank";
pub const NOTES: &str = "notes";
pub const EXTERNAL_ID: &str = "external_id";
pub const IMAGE_URL: &str = "image_url";

pub const RECORD_COLUMNS: [&str; 11] = [
    NAME,
    MARKET,
    CHANNEL_TYPE,
    ACTIVE,
    GOAL,
    RANK,
    SECONDARY_GOAL,
    SECONDARY_RANK,
    NOTES,
    EXTERNAL_ID,
    IMAGE_URL,
];

const ALIASES: [&[&str]; 11] = [
    &[NAME, "full_name"],
    &[MARKET],
    &[CHANNEL_TYPE, "type"],
    &[ACTIVE],
    &[GOAL],
    &[RANK],
    &[SECONDARY_GOAL, "fm_goal"],
    &[SECONDARY_RANK, "fm_rank"],
    &[NOTES, "closer_notes"],
    &[EXTERNAL_ID, "closer_id", "salesforce_id"],
    &[IMAGE_URL, "profile_picture"],
];

pub const DEFAULT_GOAL: i64 = 0;
pub const DEFAULT_RANK: i64 = 0;
pub const DEFAULT_SECONDARY_GOAL: i64 = 0;
pub const DEFAULT_SECONDARY_RANK: i64 = 100;

/// One closer's target entry, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub market: String,
    pub channel_type: String,
    pub active: bool,
    pub goal: i64,
    pub rank: i64,
    pub secondary_goal: i64,
    pub secondary_rank: i64,
    pub notes: String,
    pub external_id: String,
    pub image_url: String,
}

impl Record {
    /// Cells in [`RECORD_COLUMNS`] order.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::text(&self.name),
            Value::text(&self.market),
            Value::text(&self.channel_type),
            Value::Boolean(self.active),
            Value::Integer(self.goal),
            Value::Integer(self.rank),
            Value::Integer(self.secondary_goal),
            Value::Integer(self.secondary_rank),
            Value::text(&self.notes),
            Value::text(&self.external_id),
            Value::text(&self.image_url),
        ]
    }
}

pub fn record_headers() -> Vec<String> {
    RECORD_COLUMNS.iter().map(|c| c.to_string()).collect()
}

pub fn records_to_frame(records: &[Record]) -> Frame {
    let mut frame = Frame::new(record_headers());
    for record in records {
        // Width always matches RECORD_COLUMNS.
        let _ = frame.push_row(record.to_row());
    }
    frame
}

/// Valid enum sets and fallbacks applied during normalization and checked
/// again before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    pub channel_types: Vec<String>,
    pub default_channel_type: String,
    pub markets: BTreeSet<String>,
    pub no_market: String,
    pub placeholder_image: String,
}

impl Vocabulary {
    pub fn new(config: &Config, markets: impl IntoIterator<Item = String>) -> Self {
        Self {
            channel_types: config.channel_types.clone(),
            default_channel_type: config.default_channel_type.clone(),
            markets: markets.into_iter().collect(),
            no_market: config.no_market.clone(),
            placeholder_image: config.placeholder_image.clone(),
        }
    }

    /// Market names from a market reference read. Blank keys are skipped.
    pub fn market_names(frame: &Frame) -> Result<BTreeSet<String>, FrameError> {
        let idx = frame.require_column(MARKET)?;
        Ok(frame
            .rows()
            .iter()
            .map(|row| row[idx].as_display().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub fn is_channel_type(&self, value: &str) -> bool {
        self.channel_types.iter().any(|c| c == value)
    }

    pub fn is_market(&self, value: &str) -> bool {
        value == self.no_market || self.markets.contains(value)
    }

    pub fn coerce_channel_type(&self, value: Option<&Value>) -> String {
        let candidate = value.map(|v| v.as_display()).unwrap_or_default();
        if self.is_channel_type(&candidate) {
            candidate
        } else {
            self.default_channel_type.clone()
        }
    }

    pub fn coerce_market(&self, value: Option<&Value>) -> String {
        let candidate = value.map(|v| v.as_display()).unwrap_or_default();
        if self.markets.contains(&candidate) {
            candidate
        } else {
            self.no_market.clone()
        }
    }
}

/// Index of `column` (one of [`RECORD_COLUMNS`]) in `frame`, accepting the
/// legacy spellings.
pub fn locate_column(frame: &Frame, column: &str) -> Option<usize> {
    RECORD_COLUMNS
        .iter()
        .position(|c| *c == column)
        .and_then(|i| frame.first_column_index(ALIASES[i]))
        .or_else(|| frame.column_index(column))
}

/// Normalizes every row of `frame` into a [`Record`].
pub fn normalize_frame(frame: &Frame, vocabulary: &Vocabulary) -> Result<Vec<Record>, FrameError> {
    let map = ColumnMap::resolve(frame)?;
    Ok(frame
        .rows()
        .iter()
        .map(|row| map.normalize_row(row, vocabulary))
        .collect())
}

struct ColumnMap {
    name: usize,
    others: [Option<usize>; 10],
}

impl ColumnMap {
    fn resolve(frame: &Frame) -> Result<Self, FrameError> {
        let name = frame
            .first_column_index(ALIASES[0])
            .ok_or_else(|| FrameError::MissingColumn(NAME.to_string()))?;
        let mut others = [None; 10];
        for (slot, aliases) in others.iter_mut().zip(ALIASES.iter().skip(1)) {
            *slot = frame.first_column_index(aliases);
        }
        Ok(Self { name, others })
    }

    fn get<'a>(&self, row: &'a [Value], field: usize) -> Option<&'a Value> {
        self.others[field - 1].and_then(|idx| row.get(idx))
    }

    fn normalize_row(&self, row: &[Value], vocabulary: &Vocabulary) -> Record {
        let text = |field: usize| {
            self.get(row, field)
                .map(Value::as_display)
                .unwrap_or_default()
        };
        let integer = |field: usize, default: i64| coerce_integer(self.get(row, field), default);
        let image = text(10);
        Record {
            name: row
                .get(self.name)
                .map(|v| v.as_display().trim().to_string())
                .unwrap_or_default(),
            market: vocabulary.coerce_market(self.get(row, 1)),
            channel_type: vocabulary.coerce_channel_type(self.get(row, 2)),
            active: self.get(row, 3).and_then(parse_flag).unwrap_or(false),
            goal: integer(4, DEFAULT_GOAL),
            rank: integer(5, DEFAULT_RANK),
            secondary_goal: integer(6, DEFAULT_SECONDARY_GOAL),
            secondary_rank: integer(7, DEFAULT_SECONDARY_RANK),
            notes: text(8),
            external_id: text(9),
            image_url: if image.trim().is_empty() {
                vocabulary.placeholder_image.clone()
            } else {
                image
            },
        }
    }
}

/// Integral values pass through, fractional ones truncate, anything else
/// (including blanks) takes `default`.
fn coerce_integer(value: Option<&Value>, default: i64) -> i64 {
    let Some(value) = value else {
        return default;
    };
    if let Some(parsed) = value.as_integer() {
        return parsed;
    }
    match value {
        Value::Float(f) if f.is_finite() => f.trunc() as i64,
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => f.trunc() as i64,
            _ => default,
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vocabulary() -> Vocabulary {
        Vocabulary::new(
            &Config::default(),
            ["West".to_string(), "East".to_string()],
        )
    }

    fn frame(headers: &[&str], rows: Vec<Vec<Value>>) -> Frame {
        Frame::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn missing_fields_take_defaults() {
        let input = frame(&["NAME"], vec![vec![Value::text("Ana")]]);
        let records = normalize_frame(&input, &vocabulary()).unwrap();
        assert_eq!(
            records,
            vec![Record {
                name: "Ana".into(),
                market: "No Market".into(),
                channel_type: "Hybrid".into(),
                active: false,
                goal: 0,
                rank: 0,
                secondary_goal: 0,
                secondary_rank: 100,
                notes: String::new(),
                external_id: String::new(),
                image_url: crate::config::DEFAULT_PLACEHOLDER_IMAGE.into(),
            }]
        );
    }

    #[test]
    fn enum_values_are_coerced_not_rejected() {
        let input = frame(
            &["FULL_NAME", "MARKET", "TYPE"],
            vec![
                vec![Value::text("Ana"), Value::text("West"), Value::text("bogus")],
                vec![
                    Value::text("Ben"),
                    Value::text("Atlantis"),
                    Value::text("Web To Home"),
                ],
            ],
        );
        let records = normalize_frame(&input, &vocabulary()).unwrap();
        assert_eq!(records[0].market, "West");
        assert_eq!(records[0].channel_type, "Hybrid");
        assert_eq!(records[1].market, "No Market");
        assert_eq!(records[1].channel_type, "Web To Home");
    }

    #[test]
    fn legacy_columns_and_tri_state_active() {
        let input = frame(
            &["NAME", "ACTIVE", "FM_GOAL", "FM_RANK", "CLOSER_ID", "GOAL"],
            vec![
                vec![
                    Value::text("Ana"),
                    Value::text(" YES "),
                    Value::Float(7.0),
                    Value::Null,
                    Value::text("006A"),
                    Value::text("4.9"),
                ],
                vec![
                    Value::text("Ben"),
                    Value::Null,
                    Value::text("x"),
                    Value::Integer(3),
                    Value::Null,
                    Value::Null,
                ],
            ],
        );
        let records = normalize_frame(&input, &vocabulary()).unwrap();
        assert!(records[0].active);
        assert_eq!(records[0].secondary_goal, 7);
        assert_eq!(records[0].secondary_rank, 100);
        assert_eq!(records[0].external_id, "006A");
        assert_eq!(records[0].goal, 4);
        assert!(!records[1].active);
        assert_eq!(records[1].secondary_goal, 0);
        assert_eq!(records[1].secondary_rank, 3);
    }

    #[test]
    fn missing_name_column_is_fatal() {
        let input = frame(&["MARKET"], vec![vec![Value::text("West")]]);
        assert_eq!(
            normalize_frame(&input, &vocabulary()),
            Err(FrameError::MissingColumn("name".into()))
        );
    }

    #[test]
    fn market_names_skip_blank_keys() {
        let input = frame(
            &["MARKET"],
            vec![
                vec![Value::text("West")],
                vec![Value::Null],
                vec![Value::text(" ")],
            ],
        );
        let names = Vocabulary::market_names(&input).unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["West"]);
    }

    fn raw_cell() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            (-1000i64..1000).prop_map(Value::Integer),
            (-1000.0f64..1000.0).prop_map(Value::Float),
            "[ a-zA-Z0-9.]{0,8}".prop_map(Value::Text),
            prop_oneof![Just("West"), Just("Hybrid"), Just("yes"), Just("No")]
                .prop_map(Value::text),
        ]
    }

    proptest! {
        #[test]
        fn normalizing_a_normalized_record_is_stable(cells in proptest::collection::vec(raw_cell(), 11)) {
            let vocab = vocabulary();
            let input = Frame::from_rows(record_headers(), vec![cells]).unwrap();
            let once = normalize_frame(&input, &vocab).unwrap();
            let twice = normalize_frame(&records_to_frame(&once), &vocab).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
