//! Query results
//!
//! Converts raw driver responses into the engine-independent `QueryResult`
//! shape, and offers paging and search over it for display.

use crate::database::driver::DriverResponse;
use crate::database::types::TypeCatalog;
use crate::database::value::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A typed field descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub data_type: String,
}

/// One result row, column order preserved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Build a row from `(column, value)` pairs
    pub fn new(cells: Vec<(String, Value)>) -> Self {
        Self { cells }
    }

    /// Value of the first column with this name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Values in column order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Normalized result of a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Empty for statements that return no rows
    pub fields: Vec<FieldDescriptor>,
    /// `rows.len()` for row-returning statements, affected rows otherwise
    pub row_count: u64,
    pub command: String,
    pub duration: Duration,
}

/// A window over a result's rows
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage<'a> {
    /// Zero-based page index, clamped to the last page
    pub index: usize,
    pub total_pages: usize,
    pub rows: &'a [Row],
}

impl QueryResult {
    /// Normalize a raw driver response.
    ///
    /// Field types go through the type catalog, so unknown identifiers still
    /// produce a displayable name.
    pub fn from_driver(response: DriverResponse, duration: Duration) -> Self {
        let DriverResponse {
            rows,
            fields,
            row_count,
            command_tag,
        } = response;

        let rows: Vec<Row> = rows
            .into_iter()
            .map(|values| {
                Row::new(
                    fields
                        .iter()
                        .map(|f| f.name.clone())
                        .zip(values)
                        .collect(),
                )
            })
            .collect();

        let row_count = if fields.is_empty() {
            row_count
        } else {
            rows.len() as u64
        };

        let fields = fields
            .into_iter()
            .map(|f| FieldDescriptor {
                data_type: TypeCatalog::resolve(f.type_id).into_owned(),
                name: f.name,
            })
            .collect();

        Self {
            rows,
            fields,
            row_count,
            command: command_tag,
            duration,
        }
    }

    /// Whether the statement produced a row set
    pub fn returns_rows(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Slice out one page of rows
    pub fn page(&self, index: usize, page_size: usize) -> ResultPage<'_> {
        let page_size = page_size.max(1);
        let total_pages = self.rows.len().div_ceil(page_size).max(1);
        let index = index.min(total_pages - 1);
        let start = (index * page_size).min(self.rows.len());
        let end = (start + page_size).min(self.rows.len());

        ResultPage {
            index,
            total_pages,
            rows: &self.rows[start..end],
        }
    }

    /// Rows where any cell contains `needle`, ignoring case
    pub fn search(&self, needle: &str) -> Vec<&Row> {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return self.rows.iter().collect();
        }
        self.rows
            .iter()
            .filter(|row| {
                row.values()
                    .any(|v| !v.is_null() && v.to_string().to_lowercase().contains(&needle))
            })
            .collect()
    }
}
