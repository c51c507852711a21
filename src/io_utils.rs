//! Grid file I/O.
//!
//! The grid handed to an editor and read back is a CSV (or TSV) file. This
//! module resolves delimiters from extensions, decodes input in a chosen
//! encoding, and moves whole [`Frame`]s in and out. The `-` path means
//! stdin/stdout. Cells read from a grid are text; empty cells become nulls.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{data::Value, frame::Frame};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    Ok(if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening grid file {path:?}"))?,
        ))
    })
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating grid file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a whole grid file into a frame.
pub fn read_frame(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Frame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(open_input(path)?);
    let headers = decode_record(reader.byte_headers()?, encoding)?;
    let mut frame = Frame::new(headers);
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let cells = decode_record(&record, encoding)?
            .into_iter()
            .map(|cell| {
                if cell.is_empty() {
                    Value::Null
                } else {
                    Value::Text(cell)
                }
            })
            .collect();
        frame
            .push_row(cells)
            .with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
    }
    Ok(frame)
}

/// Writes `frame` as CSV to `path` (stdout when `None` or `-`).
pub fn write_frame(path: Option<&Path>, frame: &Frame, delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_writer(open_output(path)?);
    writer
        .write_record(frame.headers())
        .context("Writing grid headers")?;
    for (idx, row) in frame.to_display_rows().iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("Writing grid row {}", idx + 2))?;
    }
    writer.flush().context("Flushing grid writer")?;
    Ok(())
}
