//! Write statements for targets and markets.
//!
//! Values travel as bind parameters; [`Statement::render_inline`] exists for
//! dry runs and logs and escapes text by doubling single quotes. Every written
//! row is stamped with `updated_at`.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    config::Tables,
    data::{Value, parse_flag},
    diff::{ChangedRow, MarketRow},
    error::RowError,
    frame::Frame,
    normalize::{self, Record, Vocabulary},
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Integer(i64),
    Text(String),
}

impl Param {
    fn literal(&self) -> String {
        match self {
            Param::Null => "NULL".to_string(),
            Param::Integer(i) => i.to_string(),
            Param::Text(s) => format!("'{}'", escape_literal(s)),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Integer(value)
    }
}

/// SQL with `?N` placeholders plus the values bound to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    /// Natural key of the row the statement writes.
    pub key: String,
    /// Human-readable description reported on success.
    pub label: String,
    /// Prefix of the report line when the data source rejects the statement.
    pub failure: String,
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    /// The statement with every placeholder replaced by an escaped literal.
    pub fn render_inline(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut chars = self.sql.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '?' {
                out.push(ch);
                continue;
            }
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|c| c.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            match digits
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| self.params.get(idx))
            {
                Some(param) => out.push_str(&param.literal()),
                None => {
                    out.push('?');
                    out.push_str(&digits);
                }
            }
        }
        out
    }
}

/// Doubles single quotes so `value` can sit inside a `'...'` literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

const TARGET_INSERT_COLUMNS: [&str; 12] = [
    normalize::NAME,
    normalize::EXTERNAL_ID,
    normalize::GOAL,
    normalize::RANK,
    normalize::SECONDARY_GOAL,
    normalize::SECONDARY_RANK,
    normalize::ACTIVE,
    normalize::CHANNEL_TYPE,
    normalize::MARKET,
    normalize::NOTES,
    normalize::IMAGE_URL,
    "updated_at",
];

/// Cell values of one validated target, in [`TARGET_INSERT_COLUMNS`] order.
struct TargetValues {
    name: String,
    external_id: String,
    goal: i64,
    rank: i64,
    secondary_goal: i64,
    secondary_rank: i64,
    active: bool,
    channel_type: String,
    market: String,
    notes: String,
    image_url: String,
}

impl TargetValues {
    fn params(self, updated_at: String) -> Vec<Param> {
        vec![
            self.name.into(),
            self.external_id.into(),
            self.goal.into(),
            self.rank.into(),
            self.secondary_goal.into(),
            self.secondary_rank.into(),
            active_text(self.active).into(),
            self.channel_type.into(),
            self.market.into(),
            self.notes.into(),
            self.image_url.into(),
            updated_at.into(),
        ]
    }
}

/// The warehouse stores the active flag as `Yes`/`No`.
pub fn active_text(active: bool) -> &'static str {
    if active { "Yes" } else { "No" }
}

pub struct StatementBuilder<'a> {
    tables: &'a Tables,
    vocabulary: &'a Vocabulary,
    now: NaiveDateTime,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(tables: &'a Tables, vocabulary: &'a Vocabulary, now: NaiveDateTime) -> Self {
        Self {
            tables,
            vocabulary,
            now,
        }
    }

    fn timestamp(&self) -> String {
        format_timestamp(self.now)
    }

    /// Update-or-insert of a changed grid row, keyed on name. The external id
    /// is only written when the row is inserted.
    pub fn upsert_target(&self, headers: &[String], row: &ChangedRow) -> Result<Statement, RowError> {
        let values = self.target_values(headers, row)?;
        let name = values.name.clone();
        let columns = TARGET_INSERT_COLUMNS.join(", ");
        let placeholders = placeholders(TARGET_INSERT_COLUMNS.len());
        let updates = TARGET_INSERT_COLUMNS
            .iter()
            .filter(|c| **c != normalize::NAME && **c != normalize::EXTERNAL_ID)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
             ON CONFLICT({key}) DO UPDATE SET {updates}",
            table = self.tables.targets,
            key = normalize::NAME,
        );
        Ok(Statement {
            key: name.clone(),
            label: format!("Saved changes for {name}"),
            failure: format!("Error saving changes for {name}"),
            sql,
            params: values.params(self.timestamp()),
        })
    }

    /// Plain insert for the add-closer form; an existing name is a write error.
    pub fn insert_target(&self, record: &Record) -> Result<Statement, RowError> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            return Err(RowError::EmptyKey {
                column: normalize::NAME.to_string(),
            });
        }
        self.check_market(&record.market)?;
        self.check_channel_type(&record.channel_type)?;
        let values = TargetValues {
            name: name.clone(),
            external_id: record.external_id.clone(),
            goal: record.goal,
            rank: record.rank,
            secondary_goal: record.secondary_goal,
            secondary_rank: record.secondary_rank,
            active: record.active,
            channel_type: record.channel_type.clone(),
            market: record.market.clone(),
            notes: record.notes.clone(),
            image_url: record.image_url.clone(),
        };
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders})",
            table = self.tables.targets,
            columns = TARGET_INSERT_COLUMNS.join(", "),
            placeholders = placeholders(TARGET_INSERT_COLUMNS.len()),
        );
        Ok(Statement {
            key: name.clone(),
            label: format!("You successfully added {name}"),
            failure: format!("Error adding {name}"),
            sql,
            params: values.params(self.timestamp()),
        })
    }

    pub fn insert_market(&self, row: &MarketRow) -> Result<Statement, RowError> {
        let (market, group, rank, notes) = market_values(row)?;
        let sql = format!(
            "INSERT INTO {table} (market, market_group, rank, notes, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            table = self.tables.markets
        );
        let label = format!("Inserted new market '{market}'");
        Ok(Statement {
            key: market.clone(),
            failure: format!("Error processing {label}"),
            label,
            sql,
            params: vec![
                market.into(),
                group.into(),
                rank,
                notes.into(),
                self.timestamp().into(),
            ],
        })
    }

    pub fn update_market(&self, row: &MarketRow) -> Result<Statement, RowError> {
        let (market, group, rank, notes) = market_values(row)?;
        let sql = format!(
            "UPDATE {table} SET market_group = ?1, rank = ?2, notes = ?3, updated_at = ?4 \
             WHERE market = ?5",
            table = self.tables.markets
        );
        let label = format!("Updated market '{market}'");
        Ok(Statement {
            key: market.clone(),
            failure: format!("Error processing {label}"),
            label,
            sql,
            params: vec![
                group.into(),
                rank,
                notes.into(),
                self.timestamp().into(),
                market.into(),
            ],
        })
    }

    pub fn delete_market(&self, market: &str) -> Statement {
        let label = format!("Deleted market '{market}'");
        Statement {
            key: market.to_string(),
            failure: format!("Error processing {label}"),
            label,
            sql: format!("DELETE FROM {} WHERE market = ?1", self.tables.markets),
            params: vec![market.into()],
        }
    }

    fn target_values(&self, headers: &[String], row: &ChangedRow) -> Result<TargetValues, RowError> {
        let name = row.key.trim().to_string();
        if name.is_empty() {
            return Err(RowError::EmptyKey {
                column: normalize::NAME.to_string(),
            });
        }
        let frame = Frame::from_rows(headers.to_vec(), vec![row.values.clone()])
            .map_err(|err| RowError::Write(err.to_string()))?;
        let cell = |column: &str| {
            normalize::locate_column(&frame, column).and_then(|idx| frame.cell(0, idx))
        };
        let text = |column: &str| cell(column).map(Value::as_display).unwrap_or_default();
        let integer = |column: &str, default: i64| match cell(column) {
            None => Ok(default),
            Some(value) => value.as_integer().ok_or_else(|| RowError::NotInteger {
                column: column.to_string(),
                value: value.as_display(),
            }),
        };

        let market = text(normalize::MARKET).trim().to_string();
        self.check_market(&market)?;
        let channel_type = text(normalize::CHANNEL_TYPE).trim().to_string();
        self.check_channel_type(&channel_type)?;
        let image_url = text(normalize::IMAGE_URL);

        Ok(TargetValues {
            name,
            external_id: text(normalize::EXTERNAL_ID),
            goal: integer(normalize::GOAL, normalize::DEFAULT_GOAL)?,
            rank: integer(normalize::RANK, normalize::DEFAULT_RANK)?,
            secondary_goal: integer(normalize::SECONDARY_GOAL, normalize::DEFAULT_SECONDARY_GOAL)?,
            secondary_rank: integer(normalize::SECONDARY_RANK, normalize::DEFAULT_SECONDARY_RANK)?,
            active: cell(normalize::ACTIVE).and_then(parse_flag).unwrap_or(false),
            channel_type,
            market,
            notes: text(normalize::NOTES),
            image_url: if image_url.trim().is_empty() {
                self.vocabulary.placeholder_image.clone()
            } else {
                image_url
            },
        })
    }

    fn check_market(&self, market: &str) -> Result<(), RowError> {
        if self.vocabulary.is_market(market) {
            Ok(())
        } else {
            Err(RowError::NotAllowed {
                column: normalize::MARKET.to_string(),
                value: market.to_string(),
            })
        }
    }

    fn check_channel_type(&self, channel_type: &str) -> Result<(), RowError> {
        if self.vocabulary.is_channel_type(channel_type) {
            Ok(())
        } else {
            Err(RowError::NotAllowed {
                column: normalize::CHANNEL_TYPE.to_string(),
                value: channel_type.to_string(),
            })
        }
    }
}

/// Validated market cells: key, group, rank (blank → NULL), notes.
fn market_values(row: &MarketRow) -> Result<(String, String, Param, String), RowError> {
    let market = row.market.trim().to_string();
    if market.is_empty() {
        return Err(RowError::EmptyKey {
            column: crate::diff::MARKET_KEY.to_string(),
        });
    }
    let rank = if row.rank.is_blank() {
        Param::Null
    } else {
        match row.rank.as_integer() {
            Some(rank) => Param::Integer(rank),
            None => {
                return Err(RowError::NotInteger {
                    column: crate::diff::MARKET_RANK.to_string(),
                    value: row.rank.as_display(),
                });
            }
        }
    };
    Ok((
        market,
        row.market_group.as_display(),
        rank,
        row.notes.as_display(),
    ))
}

fn placeholders(count: usize) -> String {
    let mut out = String::new();
    for idx in 1..=count {
        if idx > 1 {
            out.push_str(", ");
        }
        let _ = write!(out, "?{idx}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-06 14:30:00", TIMESTAMP_FORMAT).unwrap()
    }

    fn vocabulary() -> Vocabulary {
        Vocabulary::new(&Config::default(), ["West".to_string()])
    }

    fn grid_row(goal: Value, notes: &str) -> (Vec<String>, ChangedRow) {
        let headers = normalize::record_headers();
        let values = vec![
            Value::text("O'Neil"),
            Value::text("West"),
            Value::text("Hybrid"),
            Value::text("True"),
            goal,
            Value::text("2"),
            Value::Integer(3),
            Value::Integer(4),
            Value::text(notes),
            Value::text("006A"),
            Value::text(""),
        ];
        (
            headers,
            ChangedRow {
                key: "O'Neil".into(),
                values,
                changed_columns: vec!["goal".into()],
            },
        )
    }

    #[test]
    fn upsert_binds_full_row_and_timestamp() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let (headers, row) = grid_row(Value::text(" 6 "), "call back");
        let statement = builder.upsert_target(&headers, &row).unwrap();
        assert!(statement.sql.starts_with("INSERT INTO closer_targets (name, external_id"));
        assert!(statement.sql.contains("ON CONFLICT(name) DO UPDATE SET goal = excluded.goal"));
        assert!(!statement.sql.contains("external_id = excluded.external_id"));
        assert_eq!(statement.params[0], Param::Text("O'Neil".into()));
        assert_eq!(statement.params[2], Param::Integer(6));
        assert_eq!(statement.params[6], Param::Text("Yes".into()));
        assert_eq!(
            statement.params[10],
            Param::Text(crate::config::DEFAULT_PLACEHOLDER_IMAGE.into())
        );
        assert_eq!(statement.params[11], Param::Text("2024-05-06 14:30:00".into()));
        assert_eq!(statement.label, "Saved changes for O'Neil");
    }

    #[test]
    fn non_integer_goal_is_a_row_validation_error() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let (headers, row) = grid_row(Value::text("6.5"), "");
        let err = builder.upsert_target(&headers, &row).unwrap_err();
        assert_eq!(
            err,
            RowError::NotInteger {
                column: "goal".into(),
                value: "6.5".into()
            }
        );
        assert!(err.is_validation());
    }

    #[test]
    fn unknown_channel_type_is_rejected_before_writing() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let (headers, mut row) = grid_row(Value::Integer(1), "");
        row.values[2] = Value::text("Door Knocking");
        assert!(matches!(
            builder.upsert_target(&headers, &row),
            Err(RowError::NotAllowed { .. })
        ));
    }

    #[test]
    fn render_inline_escapes_quotes() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let (headers, row) = grid_row(Value::Integer(6), "it's 'fine'");
        let inline = builder.upsert_target(&headers, &row).unwrap().render_inline();
        assert!(inline.contains("VALUES ('O''Neil', '006A', 6, 2, 3, 4, 'Yes', 'Hybrid', 'West', 'it''s ''fine''',"));
        assert!(!inline.contains('?'));
    }

    #[test]
    fn market_rank_blank_is_null_and_empty_key_fails() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let row = MarketRow {
            market: "Reno".into(),
            market_group: Value::text("Nevada"),
            rank: Value::text(" "),
            notes: Value::Null,
        };
        let insert = builder.insert_market(&row).unwrap();
        assert_eq!(insert.params[2], Param::Null);
        assert_eq!(insert.params[3], Param::Text(String::new()));
        assert_eq!(
            insert.render_inline(),
            "INSERT INTO markets (market, market_group, rank, notes, updated_at) \
             VALUES ('Reno', 'Nevada', NULL, '', '2024-05-06 14:30:00')"
        );

        let blank = MarketRow {
            market: String::new(),
            ..row.clone()
        };
        assert_eq!(
            builder.insert_market(&blank),
            Err(RowError::EmptyKey {
                column: "market".into()
            })
        );

        let bad_rank = MarketRow {
            rank: Value::text("first"),
            ..row
        };
        assert!(matches!(
            builder.update_market(&bad_rank),
            Err(RowError::NotInteger { .. })
        ));
    }

    #[test]
    fn delete_market_binds_key() {
        let tables = Tables::default();
        let vocab = vocabulary();
        let builder = StatementBuilder::new(&tables, &vocab, now());
        let statement = builder.delete_market("Bob's Town");
        assert_eq!(
            statement.render_inline(),
            "DELETE FROM markets WHERE market = 'Bob''s Town'"
        );
    }

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }
}
