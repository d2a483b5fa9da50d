//! Parses the restricted `key: value` front matter format into a
//! [`FrontMatter`] record.
//!
//! Each entry occupies one line. Values are plain scalars, quoted scalars,
//! flow lists (`tags: [swift, haskell]`), or block lists:
//!
//! ```yaml
//! categories:
//!   - programming
//!   - functional
//! ```
//!
//! Quoted scalars and flow lists are decoded with [`serde_yaml`]; plain
//! scalars are kept exactly as written.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// A front matter value. Only scalars and lists of scalars are supported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(String),
    List(Vec<String>),
}

/// The parsed front matter of a document. The well-known keys are lifted
/// into typed fields; everything else is kept verbatim in `extra`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub layout: Option<String>,

    /// Categories in source order. Duplicates are preserved.
    pub categories: Vec<String>,

    /// Tags in source order. Duplicates are preserved.
    pub tags: Vec<String>,

    /// Keys this pipeline doesn't interpret, retained for the layout engine.
    pub extra: BTreeMap<String, Value>,
}

impl FrontMatter {
    /// True for the front matter of a document without a front matter block.
    pub fn is_empty(&self) -> bool {
        *self == FrontMatter::default()
    }
}

/// Parses `raw` into a [`FrontMatter`]. `first_line` is the line number of
/// the first line of `raw` within its source file and is used for error
/// reporting. `date_formats` are `chrono` format strings tried in order.
pub fn parse(
    raw: &str,
    first_line: usize,
    date_formats: &[String],
) -> Result<FrontMatter, MetadataError> {
    let entries = entries(raw, first_line)?;

    let mut front_matter = FrontMatter::default();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for Entry { key, line, value } in entries {
        let canonical = key.to_ascii_lowercase();
        let known = matches!(
            canonical.as_str(),
            "title" | "date" | "layout" | "categories" | "tags"
        );
        let dedup_key = if known { canonical.clone() } else { key.clone() };
        if seen.insert(dedup_key, line).is_some() {
            return Err(MetadataError::new(line, ErrorKind::DuplicateKey(key)));
        }

        match canonical.as_str() {
            "title" => {
                front_matter.title = Some(expect_scalar(&key, line, value)?)
            }
            "layout" => {
                front_matter.layout = Some(expect_scalar(&key, line, value)?)
            }
            "date" => {
                let date = expect_scalar(&key, line, value)?;
                let parsed = parse_date(&date, date_formats).ok_or_else(|| {
                    let kind = ErrorKind::InvalidDate(date.clone());
                    MetadataError::new(line, kind)
                })?;
                front_matter.date = Some(parsed);
            }
            "categories" => front_matter.categories = into_list(value),
            "tags" => front_matter.tags = into_list(value),
            _ => {
                front_matter.extra.insert(key, value);
            }
        }
    }

    match &front_matter.title {
        Some(title) if !title.trim().is_empty() => Ok(front_matter),
        _ => Err(MetadataError::new(
            first_line,
            ErrorKind::MissingKey("title"),
        )),
    }
}

/// Parses `input` against each of `formats` in turn. Formats with an offset
/// (`%z`) keep the local time as written; date-only formats yield midnight.
pub fn parse_date(input: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let input = input.trim();
    formats.iter().find_map(|format| {
        if format.contains("%z") || format.contains("%:z") {
            return DateTime::parse_from_str(input, format)
                .ok()
                .map(|d| d.naive_local());
        }
        NaiveDateTime::parse_from_str(input, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(input, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    })
}

struct Entry {
    key: String,
    line: usize,
    value: Value,
}

/// Splits the raw text into entries, folding block list items into the key
/// that opened them.
fn entries(raw: &str, first_line: usize) -> Result<Vec<Entry>, MetadataError> {
    let mut entries: Vec<Entry> = Vec::new();
    // The index of an entry whose value was empty and may gather `- item`s.
    let mut open_list: Option<usize> = None;

    for (i, line) in raw.lines().enumerate() {
        let line_number = first_line + i;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let (Some(index), Some(item)) = (open_list, list_item(trimmed)) {
            let item = decode_scalar(item, line_number)?;
            match &mut entries[index].value {
                Value::List(items) => items.push(item),
                value => *value = Value::List(vec![item]),
            }
            continue;
        }

        let colon = line.find(':').ok_or_else(|| {
            MetadataError::new(line_number, ErrorKind::MissingSeparator)
        })?;
        let key = line[..colon].trim();
        if key.is_empty() {
            return Err(MetadataError::new(line_number, ErrorKind::EmptyKey));
        }
        let raw_value = line[colon + 1..].trim();

        open_list = match raw_value.is_empty() {
            true => Some(entries.len()),
            false => None,
        };
        entries.push(Entry {
            key: key.to_owned(),
            line: line_number,
            value: decode_value(raw_value, line_number)?,
        });
    }

    Ok(entries)
}

fn list_item(trimmed: &str) -> Option<&str> {
    match trimmed {
        "-" => Some(""),
        _ => trimmed.strip_prefix("- "),
    }
}

fn decode_value(raw: &str, line: usize) -> Result<Value, MetadataError> {
    if !raw.starts_with('[') {
        return decode_scalar(raw, line).map(Value::Scalar);
    }
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(serde_yaml::Value::Sequence(items)) => items
            .into_iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| invalid_value(line, raw))
            })
            .collect::<Result<Vec<String>, MetadataError>>()
            .map(Value::List),
        _ => Err(invalid_value(line, raw)),
    }
}

fn decode_scalar(raw: &str, line: usize) -> Result<String, MetadataError> {
    let raw = raw.trim();
    if !(raw.starts_with('"') || raw.starts_with('\'')) {
        return Ok(raw.to_owned());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(serde_yaml::Value::String(s)) => Ok(s),
        _ => Err(invalid_value(line, raw)),
    }
}

fn invalid_value(line: usize, raw: &str) -> MetadataError {
    MetadataError::new(line, ErrorKind::InvalidValue(raw.to_owned()))
}

fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

fn expect_scalar(
    key: &str,
    line: usize,
    value: Value,
) -> Result<String, MetadataError> {
    match value {
        Value::Scalar(s) => Ok(s),
        Value::List(_) => Err(MetadataError::new(
            line,
            ErrorKind::ExpectedScalar(key.to_owned()),
        )),
    }
}

fn into_list(value: Value) -> Vec<String> {
    match value {
        Value::List(items) => items,
        Value::Scalar(s) if s.is_empty() => Vec::new(),
        Value::Scalar(s) => vec![s],
    }
}

/// Represents malformed or incomplete front matter.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("line {line}: {kind}")]
pub struct MetadataError {
    /// The line within the source file where the problem was detected.
    pub line: usize,
    pub kind: ErrorKind,
}

impl MetadataError {
    fn new(line: usize, kind: ErrorKind) -> MetadataError {
        MetadataError { line, kind }
    }
}

/// The specific front matter problem.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ErrorKind {
    #[error("expected `key: value`, found no `:` separator")]
    MissingSeparator,

    #[error("empty key")]
    EmptyKey,

    #[error("duplicate key `{0}`")]
    DuplicateKey(String),

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("`{0}` must be a single value, not a list")]
    ExpectedScalar(String),

    #[error("invalid value `{0}`")]
    InvalidValue(String),

    #[error("date `{0}` doesn't match any accepted date format")]
    InvalidDate(String),
}
