// Listings returned by the `/models/list` and `/modules/list` endpoints.
//
// The service answers with a column-oriented object:
// `{"team": ["a", "b"], "version": [1, 2], ...}`. A list of records is
// accepted as well. `created` and `updated` hold epoch seconds and are
// rendered as UTC timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identity::normalize;

pub const EMPTY_LISTING: &str = "Empty list - nothing to show";

const TIMESTAMP_COLUMNS: &[&str] = &["created", "updated"];

/// Query filters sent with a listing request. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub team: String,
    pub project: String,
    pub name: String,
    pub version: Option<u32>,
    pub label: String,
}

impl ListFilter {
    /// Validate and lower-case the filter fields like identity fields.
    pub fn normalized(&self) -> Result<Self> {
        Ok(ListFilter {
            team: normalize("TEAM", &self.team)?,
            project: normalize("PROJECT", &self.project)?,
            name: normalize("NAME", &self.name)?,
            version: self.version,
            label: normalize("LABEL", &self.label)?,
        })
    }

    /// Query pairs in the order the service documents them. A missing
    /// version is sent as `0`.
    pub(crate) fn query(&self, with_label: bool) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("team", self.team.clone()),
            ("project", self.project.clone()),
            ("name", self.name.clone()),
            ("version", self.version.unwrap_or(0).to_string()),
        ];
        if with_label {
            pairs.push(("label", self.label.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    fn push_column(&mut self, name: &str, fill: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Empty,
    Table(Table),
}

impl Listing {
    /// Parse a listing body. `label_column` asks for a `label` column to be
    /// present (filled with empty strings when the service omitted it).
    pub fn parse(body: &str, label_column: bool) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        let mut table = match value {
            Value::Object(columns) => from_columns(columns)?,
            Value::Array(records) => from_records(records)?,
            other => {
                return Err(Error::MalformedListing(format!(
                    "expected an object or an array, got {}",
                    other
                )))
            }
        };

        if table.rows.is_empty() {
            return Ok(Listing::Empty);
        }

        for column in TIMESTAMP_COLUMNS {
            if let Some(index) = table.columns.iter().position(|c| c == column) {
                for row in &mut table.rows {
                    row[index] = epoch_to_timestamp(&row[index]);
                }
            }
        }

        if label_column {
            match table.columns.iter().position(|c| c == "label") {
                Some(index) => {
                    for row in &mut table.rows {
                        if row[index].is_null() {
                            row[index] = Value::String(String::new());
                        }
                    }
                }
                None => table.push_column("label", Value::String(String::new())),
            }
        }

        Ok(Listing::Table(table))
    }
}

fn from_columns(columns: Map<String, Value>) -> Result<Table> {
    let mut names = Vec::with_capacity(columns.len());
    let mut cells: Vec<Vec<Value>> = Vec::with_capacity(columns.len());
    for (name, column) in columns {
        let Value::Array(values) = column else {
            return Err(Error::MalformedListing(format!("column {} is not an array", name)));
        };
        names.push(name);
        cells.push(values);
    }

    let height = cells.first().map(Vec::len).unwrap_or(0);
    if let Some(index) = cells.iter().position(|c| c.len() != height) {
        return Err(Error::MalformedListing(format!(
            "column {} has {} values, expected {}",
            names[index],
            cells[index].len(),
            height
        )));
    }

    let mut rows = vec![Vec::with_capacity(names.len()); height];
    for column in cells {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    Ok(Table {
        columns: names,
        rows,
    })
}

fn from_records(records: Vec<Value>) -> Result<Table> {
    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for record in records {
        let Value::Object(object) = record else {
            return Err(Error::MalformedListing("record is not an object".into()));
        };
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(object);
    }

    let rows = objects
        .into_iter()
        .map(|mut object| {
            columns
                .iter()
                .map(|c| object.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(Table { columns, rows })
}

fn epoch_to_timestamp(value: &Value) -> Value {
    let Some(epoch) = value.as_f64() else {
        return value.clone();
    };
    let secs = epoch.floor();
    let nanos = (((epoch - secs) * 1e9).round() as u32).min(999_999_999);
    match DateTime::<Utc>::from_timestamp(secs as i64, nanos) {
        Some(ts) if nanos == 0 => Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        Some(ts) => Value::String(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        None => value.clone(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let texts: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                texts
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, w)| format!("{:<w$}", name, w = *w))
            .collect();
        write!(f, "{}", header.join("  ").trim_end())?;
        for row in &texts {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
                .collect();
            write!(f, "\n{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listing::Empty => f.write_str(EMPTY_LISTING),
            Listing::Table(table) => table.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_columns_are_the_empty_sentinel() {
        let body = json!({
            "team": [], "project": [], "version": [], "label": [],
            "id": [], "status": [], "created": [], "updated": []
        })
        .to_string();
        let listing = Listing::parse(&body, true).unwrap();
        assert_eq!(listing, Listing::Empty);
        assert_eq!(listing.to_string(), EMPTY_LISTING);
    }

    #[test]
    fn epochs_become_timestamps() {
        let body = json!({
            "team": ["t"], "version": [1], "label": ["canary"],
            "created": [0], "updated": [1_600_000_000.5]
        })
        .to_string();
        let Listing::Table(table) = Listing::parse(&body, true).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(table.columns, vec!["team", "version", "label", "created", "updated"]);
        assert_eq!(table.column("created").unwrap(), vec![&json!("1970-01-01 00:00:00")]);
        assert_eq!(
            table.column("updated").unwrap(),
            vec![&json!("2020-09-13 12:26:40.500000")]
        );
    }

    #[test]
    fn missing_label_column_is_back_filled() {
        let body = json!({
            "team": ["t", "t"], "version": [1, 2], "created": [0, 0], "updated": [0, 0]
        })
        .to_string();
        let Listing::Table(table) = Listing::parse(&body, true).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(table.columns.last().unwrap(), "label");
        assert_eq!(table.column("label").unwrap(), vec![&json!(""), &json!("")]);
    }

    #[test]
    fn modules_do_not_get_a_label_column() {
        let body = json!({"team": ["t"], "version": [3]}).to_string();
        let Listing::Table(table) = Listing::parse(&body, false).unwrap() else {
            panic!("expected a table");
        };
        assert!(table.column("label").is_none());
    }

    #[test]
    fn records_are_accepted() {
        let body = json!([
            {"team": "t", "version": 1, "label": null},
            {"team": "t", "version": 2, "label": "stable"}
        ])
        .to_string();
        let Listing::Table(table) = Listing::parse(&body, true).unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.column("label").unwrap(), vec![&json!(""), &json!("stable")]);
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let body = json!({"team": ["a", "b"], "version": [1]}).to_string();
        assert!(matches!(
            Listing::parse(&body, true),
            Err(Error::MalformedListing(_))
        ));
    }

    #[test]
    fn table_renders_aligned_columns() {
        let table = Table {
            columns: vec!["team".into(), "version".into()],
            rows: vec![vec![json!("alpha"), json!(1)], vec![json!("b"), json!(10)]],
        };
        assert_eq!(
            table.to_string(),
            "team   version\nalpha  1\nb      10"
        );
    }
}
