// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::{Neo4jError, Result, ValueReceive};

/// Column names and rows of one statement's result, as received from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    columns: Vec<String>,
    rows: Vec<Vec<ValueReceive>>,
}

impl RawResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ValueReceive>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ValueReceive>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<ValueReceive>>) {
        (self.columns, self.rows)
    }
}

/// Strategy turning a [`RawResult`] into the type handed to the caller.
pub trait ResultFormatter: Debug + Send + Sync {
    type Output;

    fn format(&self, result: RawResult) -> Result<Self::Output>;
}

pub type Row = HashMap<String, ValueReceive>;

/// Formats every row as a map from column name to value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormatter;

impl ResultFormatter for BasicFormatter {
    type Output = Vec<Row>;

    fn format(&self, result: RawResult) -> Result<Self::Output> {
        let (columns, rows) = result.into_parts();
        rows.into_iter()
            .map(|row| {
                if row.len() != columns.len() {
                    return Err(Neo4jError::protocol_error(format!(
                        "row has {} values but result has {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                Ok(columns.iter().cloned().zip(row).collect())
            })
            .collect()
    }
}

/// Hands out the [`RawResult`] unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormatter;

impl ResultFormatter for RawFormatter {
    type Output = RawResult;

    fn format(&self, result: RawResult) -> Result<Self::Output> {
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_basic_formatter() {
        let raw = RawResult::new(
            vec!["name".into(), "version".into()],
            vec![
                vec![ValueReceive::String("neo4j".into()), ValueReceive::String("5.3.0".into())],
                vec![ValueReceive::String("apoc".into()), ValueReceive::Null],
            ],
        );
        let rows = BasicFormatter.format(raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], ValueReceive::String("neo4j".into()));
        assert_eq!(rows[1]["version"], ValueReceive::Null);
    }

    #[rstest]
    fn test_basic_formatter_row_mismatch() {
        let raw = RawResult::new(vec!["a".into()], vec![vec![]]);
        let err = BasicFormatter.format(raw).unwrap_err();
        assert!(matches!(err, Neo4jError::ProtocolError { .. }));
    }
}
