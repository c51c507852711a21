//! The warehouse boundary.
//!
//! The core needs two things from storage: run a read and get a whole table
//! back, and execute one write statement. [`SqliteSource`] provides both over
//! a local SQLite file with native parameter binding.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::debug;
use rusqlite::{
    Connection, params_from_iter,
    types::{ToSql, ToSqlOutput, ValueRef},
};

use crate::{
    config::{Tables, is_identifier},
    data::Value,
    frame::Frame,
    normalize::RECORD_COLUMNS,
    statement::{Param, Statement},
};

pub trait DataSource {
    /// Runs a read query and returns the full result set.
    fn read(&mut self, query: &str) -> Result<Frame>;
    /// Executes one write statement, returning the number of rows affected.
    fn execute(&mut self, statement: &Statement) -> Result<usize>;
}

pub fn targets_query(tables: &Tables) -> String {
    format!("SELECT {} FROM {}", RECORD_COLUMNS.join(", "), tables.targets)
}

pub fn markets_query(tables: &Tables) -> String {
    format!(
        "SELECT market, market_group, rank, notes FROM {} ORDER BY market",
        tables.markets
    )
}

/// Current closers and managers, the people the add form offers.
pub fn active_users_query(tables: &Tables) -> String {
    format!(
        "SELECT DISTINCT full_name, external_id FROM {} \
         WHERE role_type IN ('Closer', 'Manager') AND term_date IS NULL",
        tables.users
    )
}

pub fn profiles_query(tables: &Tables) -> String {
    format!(
        "SELECT full_name, external_id, profile_picture FROM {}",
        tables.users
    )
}

pub fn appointments_query(tables: &Tables) -> String {
    format!("SELECT closer_id, scheduled_at FROM {}", tables.appointments)
}

pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).with_context(|| format!("Opening warehouse {path:?}"))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Creates any missing warehouse tables.
    pub fn init_schema(&self, tables: &Tables) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {targets} (
                name TEXT PRIMARY KEY,
                external_id TEXT,
                goal INTEGER,
                rank INTEGER,
                secondary_goal INTEGER,
                secondary_rank INTEGER,
                active TEXT,
                channel_type TEXT,
                market TEXT,
                notes TEXT,
                image_url TEXT,
                updated_at TEXT
            );
            CREATE TABLE IF NOT EXISTS {markets} (
                market TEXT PRIMARY KEY,
                market_group TEXT,
                rank INTEGER,
                notes TEXT,
                updated_at TEXT
            );
            CREATE TABLE IF NOT EXISTS {users} (
                full_name TEXT,
                external_id TEXT,
                profile_picture TEXT,
                role_type TEXT,
                term_date TEXT
            );
            CREATE TABLE IF NOT EXISTS {appointments} (
                closer_id TEXT,
                scheduled_at TEXT
            );",
            targets = tables.targets,
            markets = tables.markets,
            users = tables.users,
            appointments = tables.appointments,
        );
        self.conn
            .execute_batch(&ddl)
            .context("Creating warehouse tables")
    }

    /// Bulk-loads `frame` into `table`, matching columns by header name.
    pub fn insert_frame(&mut self, table: &str, frame: &Frame) -> Result<usize> {
        if !is_identifier(table) {
            return Err(anyhow!("'{table}' is not a valid table name"));
        }
        if let Some(bad) = frame.headers().iter().find(|h| !is_identifier(h)) {
            return Err(anyhow!("'{bad}' is not a valid column name"));
        }
        let placeholders = (1..=frame.headers().len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            frame.headers().join(", ")
        );
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (idx, row) in frame.rows().iter().enumerate() {
                let params = row.iter().map(value_param).collect::<Vec<_>>();
                inserted += stmt
                    .execute(params_from_iter(params.iter()))
                    .with_context(|| format!("Loading row {} into {table}", idx + 1))?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl DataSource for SqliteSource {
    fn read(&mut self, query: &str) -> Result<Frame> {
        debug!("read: {query}");
        let mut stmt = self
            .conn
            .prepare(query)
            .with_context(|| format!("Preparing query '{query}'"))?;
        let headers = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let width = headers.len();
        let mut frame = Frame::new(headers);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(cell_value(row.get_ref(idx)?));
            }
            frame.push_row(cells)?;
        }
        Ok(frame)
    }

    fn execute(&mut self, statement: &Statement) -> Result<usize> {
        debug!("execute: {}", statement.render_inline());
        Ok(self
            .conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))?)
    }
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Param::Integer(i) => ToSqlOutput::from(*i),
            Param::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn cell_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn value_param(value: &Value) -> Param {
    match value {
        Value::Null => Param::Null,
        Value::Boolean(b) => Param::Text(crate::statement::active_text(*b).to_string()),
        Value::Integer(i) => Param::Integer(*i),
        Value::Float(_) | Value::Text(_) => {
            if value.is_blank() {
                Param::Null
            } else {
                Param::Text(value.as_display())
            }
        }
    }
}
