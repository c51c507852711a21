//! Set-based tabular results exchanged with the data source and the grid.
//!
//! A [`Frame`] is a header row plus rows of [`Value`] cells of equal width.
//! Column lookup is exact first, then ASCII case-insensitive, so warehouse
//! reads (`NAME`) and exported grids (`name`) resolve the same way.

use serde::{Deserialize, Serialize};

use crate::{data::Value, error::FrameError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, FrameError> {
        let mut frame = Frame::new(headers);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), FrameError> {
        if row.len() != self.headers.len() {
            return Err(FrameError::RaggedRow {
                row: self.rows.len(),
                found: row.len(),
                expected: self.headers.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    /// First header among `candidates` present in the frame.
    pub fn first_column_index(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|name| self.column_index(name))
    }

    pub fn require_column(&self, name: &str) -> Result<usize, FrameError> {
        self.column_index(name)
            .ok_or_else(|| FrameError::MissingColumn(name.to_string()))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn to_display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Value::as_display).collect())
            .collect()
    }
}
