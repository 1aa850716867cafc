//! Field extraction primitives for line-oriented device output.
//!
//! Everything here is pure: the same text and pattern always produce the same
//! result. A pattern that matches nothing is not an error — absence is a
//! normal outcome for optional fields. An extractor that fails on a line its
//! pattern structurally matched IS an error, because it indicates the pattern
//! and the extractor disagree about the line shape.

use std::collections::HashSet;
use std::hash::Hash;

use log::trace;
use regex::{Captures, Regex};

use crate::error::TranslateError;

/// Scans `text` line by line and returns the extracted value of the first
/// matching line.
///
/// Lines are matched with trailing whitespace and `\r` removed, which is how
/// device output arrives over a pty. Returns `Ok(None)` when no line matches.
///
/// # Errors
///
/// Returns [`TranslateError::ParseMismatch`] when `extract` returns `None`
/// for a line the pattern matched.
pub fn parse_field<T, F>(text: &str, pattern: &Regex, extract: F) -> Result<Option<T>, TranslateError>
where
    F: Fn(&Captures<'_>) -> Option<T>,
{
    for line in clean_lines(text) {
        if let Some(caps) = pattern.captures(line) {
            return match extract(&caps) {
                Some(value) => Ok(Some(value)),
                None => Err(TranslateError::ParseMismatch(format!(
                    "extractor failed on matched line '{line}' (pattern '{pattern}')"
                ))),
            };
        }
    }
    Ok(None)
}

/// Returns one value per DISTINCT key among matching lines, in first-seen
/// order. Duplicate keys are suppressed; the first occurrence wins.
///
/// This is the enumeration primitive: listing device object identifiers out
/// of a `show running-config` scrape must not yield the same identifier twice.
pub fn parse_fields<K, V, KF, VF>(
    text: &str,
    pattern: &Regex,
    key: KF,
    value: VF,
) -> Result<Vec<V>, TranslateError>
where
    K: Eq + Hash + Clone,
    KF: Fn(&Captures<'_>) -> Option<K>,
    VF: Fn(K) -> V,
{
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for k in matched_keys(text, pattern, &key)? {
        if seen.insert(k.clone()) {
            values.push(value(k));
        }
    }
    trace!("parse_fields: {} distinct values", values.len());
    Ok(values)
}

/// Returns one value per matching line, duplicates included, in positional
/// order.
///
/// Consumers that zip several per-column lists back into table rows depend on
/// every match being preserved; use [`parse_fields`] when identifiers must be
/// distinct instead.
pub fn parse_non_distinct_fields<K, V, KF, VF>(
    text: &str,
    pattern: &Regex,
    key: KF,
    value: VF,
) -> Result<Vec<V>, TranslateError>
where
    KF: Fn(&Captures<'_>) -> Option<K>,
    VF: Fn(K) -> V,
{
    Ok(matched_keys(text, pattern, &key)?
        .into_iter()
        .map(value)
        .collect())
}

fn matched_keys<K, KF>(text: &str, pattern: &Regex, key: &KF) -> Result<Vec<K>, TranslateError>
where
    KF: Fn(&Captures<'_>) -> Option<K>,
{
    let mut keys = Vec::new();
    for line in clean_lines(text) {
        if let Some(caps) = pattern.captures(line) {
            match key(&caps) {
                Some(k) => keys.push(k),
                None => {
                    return Err(TranslateError::ParseMismatch(format!(
                        "key extractor failed on matched line '{line}' (pattern '{pattern}')"
                    )));
                }
            }
        }
    }
    Ok(keys)
}

fn clean_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end)
}

/// Zips parallel per-column value lists into rows by index.
///
/// All columns must have the same length; a mismatch means the per-column
/// patterns disagree about the table shape, which is a pattern bug.
pub fn zip_columns(columns: &[Vec<String>]) -> Result<Vec<Vec<String>>, TranslateError> {
    let Some(first) = columns.first() else {
        return Ok(Vec::new());
    };
    let rows = first.len();
    for (idx, column) in columns.iter().enumerate() {
        if column.len() != rows {
            return Err(TranslateError::ParseMismatch(format!(
                "column {idx} has {} rows, expected {rows}",
                column.len()
            )));
        }
    }
    Ok((0..rows)
        .map(|row| columns.iter().map(|column| column[row].clone()).collect())
        .collect())
}

/// One column of a fixed-width table, located by character offset.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub start: usize,
    /// Width in characters; `None` runs to end of line.
    pub width: Option<usize>,
}

impl Column {
    pub fn new(name: impl Into<String>, start: usize, width: Option<usize>) -> Self {
        Column {
            name: name.into(),
            start,
            width,
        }
    }
}

/// Fixed-width table parser built on top of the line primitives.
///
/// Tolerates `\r` line endings and trailing whitespace; short lines yield
/// empty cells; blank lines are skipped.
#[derive(Debug, Clone)]
pub struct FixedWidthTable {
    columns: Vec<Column>,
    header_lines: usize,
}

impl FixedWidthTable {
    pub fn new(columns: Vec<Column>) -> Self {
        FixedWidthTable {
            columns,
            header_lines: 0,
        }
    }

    /// Skips the first `n` non-blank lines (column headers, separators).
    pub fn with_header_lines(mut self, n: usize) -> Self {
        self.header_lines = n;
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Parses `text` into rows of trimmed cells, one cell per column.
    pub fn parse(&self, text: &str) -> Vec<Vec<String>> {
        clean_lines(text)
            .filter(|line| !line.is_empty())
            .skip(self.header_lines)
            .map(|line| {
                self.columns
                    .iter()
                    .map(|column| {
                        let chars = line.chars().skip(column.start);
                        let cell: String = match column.width {
                            Some(width) => chars.take(width).collect(),
                            None => chars.collect(),
                        };
                        cell.trim().to_string()
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlan_pattern() -> Regex {
        Regex::new(r"^vlan (\d+)$").expect("pattern")
    }

    #[test]
    fn parse_field_returns_first_match() {
        let text = "hostname sw1\nvlan 12\nvlan 13\n";
        let id = parse_field(text, &vlan_pattern(), |caps| {
            caps.get(1)?.as_str().parse::<u16>().ok()
        })
        .expect("parse");
        assert_eq!(id, Some(12));
    }

    #[test]
    fn parse_field_no_match_is_absence_not_error() {
        let id = parse_field("hostname sw1\n", &vlan_pattern(), |caps| {
            caps.get(1)?.as_str().parse::<u16>().ok()
        })
        .expect("no match is ok");
        assert_eq!(id, None);
        assert_eq!(
            parse_field("", &vlan_pattern(), |c| c.get(1).map(|m| m.as_str().to_string()))
                .expect("empty input"),
            None
        );
    }

    #[test]
    fn parse_field_extractor_failure_is_fatal() {
        let pattern = Regex::new(r"^mtu (\S+)$").expect("pattern");
        let err = match parse_field("mtu auto\n", &pattern, |caps| {
            caps.get(1)?.as_str().parse::<u32>().ok()
        }) {
            Ok(_) => panic!("non-numeric mtu should be a parse mismatch"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::ParseMismatch(_)));
    }

    #[test]
    fn parse_field_tolerates_crlf_and_trailing_whitespace() {
        let text = "vlan 12   \r\nname up\r\n";
        let id = parse_field(text, &vlan_pattern(), |caps| {
            caps.get(1)?.as_str().parse::<u16>().ok()
        })
        .expect("parse");
        assert_eq!(id, Some(12));
    }

    #[test]
    fn parse_fields_is_distinct_first_seen_order() {
        let text = "vlan 13\nvlan 12\nvlan 13\nvlan 14\nvlan 12\n";
        let ids = parse_fields(
            text,
            &vlan_pattern(),
            |caps| caps.get(1)?.as_str().parse::<u16>().ok(),
            |id| id,
        )
        .expect("parse");
        assert_eq!(ids, vec![13, 12, 14]);
    }

    #[test]
    fn parse_non_distinct_fields_keeps_duplicates_in_order() {
        let text = "vlan 13\nvlan 12\nvlan 13\n";
        let ids = parse_non_distinct_fields(
            text,
            &vlan_pattern(),
            |caps| caps.get(1)?.as_str().parse::<u16>().ok(),
            |id| id,
        )
        .expect("parse");
        assert_eq!(ids, vec![13, 12, 13]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "vlan 13\nvlan 12\nvlan 13\n";
        let run = || {
            parse_fields(
                text,
                &vlan_pattern(),
                |caps| caps.get(1)?.as_str().parse::<u16>().ok(),
                |id| id,
            )
            .expect("parse")
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn zip_columns_reconstructs_rows_with_placeholders() {
        let names = vec!["cable1/0/0".to_string(), "cable1/0/1".to_string()];
        let states = vec!["up".to_string(), "-".to_string()];
        let macs = vec!["0011.2233.4455".to_string(), "-".to_string()];

        let rows = zip_columns(&[names, states, macs]).expect("zip");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["cable1/0/0", "up", "0011.2233.4455"]);
        assert_eq!(rows[1], vec!["cable1/0/1", "-", "-"]);
    }

    #[test]
    fn zip_columns_rejects_ragged_input() {
        let err = match zip_columns(&[vec!["a".to_string()], vec![]]) {
            Ok(_) => panic!("ragged columns should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, TranslateError::ParseMismatch(_)));
    }

    #[test]
    fn fixed_width_table_parses_by_offset() {
        let table = FixedWidthTable::new(vec![
            Column::new("port", 0, Some(10)),
            Column::new("state", 10, Some(8)),
            Column::new("vlan", 18, None),
        ])
        .with_header_lines(1);

        let text = "Port      State   Vlan\r\neth 1/1   up      12  \r\neth 1/2   down    -\r\n\r\n";
        let rows = table.parse(text);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["eth 1/1", "up", "12"]);
        assert_eq!(rows[1], vec!["eth 1/2", "down", "-"]);
    }

    #[test]
    fn fixed_width_table_short_lines_yield_empty_cells() {
        let table = FixedWidthTable::new(vec![
            Column::new("a", 0, Some(4)),
            Column::new("b", 4, Some(4)),
        ]);
        let rows = table.parse("ab\n");
        assert_eq!(rows, vec![vec!["ab".to_string(), String::new()]]);
    }
}
