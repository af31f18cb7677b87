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

//! JSON shapes of the transactional endpoint.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::HttpResponse;
use crate::driver::formatter::RawResult;
use crate::driver::io::ResultBatch;
use crate::driver::statement::Statement;
use crate::error::ServerError;
use crate::util::abbreviate;
use crate::{Neo4jError, Result, ValueSend};

const MAX_LOGGED_BODY: usize = 200;

#[derive(Debug, Serialize)]
struct StatementEntry<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<&'a HashMap<String, ValueSend>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    statements: Vec<StatementEntry<'a>>,
    result_data_contents: [&'static str; 0],
    include_stats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bookmarks: Option<&'a [String]>,
}

/// Serialize statements into the transactional endpoint's request shape.
///
/// Empty parameter maps and bookmark lists are left out.
pub(crate) fn request_body(statements: &[Statement], bookmarks: &[String]) -> Result<Vec<u8>> {
    let body = RequestBody {
        statements: statements
            .iter()
            .map(|statement| StatementEntry {
                statement: statement.text(),
                parameters: Some(statement.parameters()).filter(|p| !p.is_empty()),
            })
            .collect(),
        result_data_contents: [],
        include_stats: false,
        bookmarks: Some(bookmarks).filter(|b| !b.is_empty()),
    };
    serde_json::to_vec(&body)
        .map_err(|e| Neo4jError::invalid_config(format!("couldn't serialize statements: {e}")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEntry {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DataEntry {
    #[serde(default)]
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataEntry>,
}

/// Body returned by every transactional endpoint request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseBody {
    #[serde(default)]
    results: Vec<ResultEntry>,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    /// URL to commit the transaction opened by this request.
    #[serde(default)]
    pub(crate) commit: Option<String>,
    #[serde(default)]
    last_bookmarks: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorsOnly {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

impl ResponseBody {
    /// Turn the body into results, failing with the first reported server error.
    pub(crate) fn into_batch(self) -> Result<ResultBatch> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(ServerError::new(error.code, error.message).into());
        }
        let results = self
            .results
            .into_iter()
            .map(|result| {
                RawResult::new(
                    result.columns,
                    result
                        .data
                        .into_iter()
                        .map(|data| data.row.into_iter().map(Into::into).collect())
                        .collect(),
                )
            })
            .collect();
        Ok(ResultBatch {
            results,
            bookmark: self.last_bookmarks.and_then(|bookmarks| bookmarks.into_iter().last()),
        })
    }
}

/// Check the status and parse the JSON body of a response.
///
/// Non-2xx responses become the server error they carry, or a protocol error if they carry
/// none. A body that doesn't parse is a protocol error as well.
pub(crate) fn interpret_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    if !response.is_success() {
        if let Ok(ErrorsOnly { errors }) = serde_json::from_slice(response.body()) {
            if let Some(error) = errors.into_iter().next() {
                return Err(ServerError::new(error.code, error.message).into());
            }
        }
        return Err(Neo4jError::protocol_error(format!(
            "server responded with status {}: {}",
            response.status(),
            abbreviate(&String::from_utf8_lossy(response.body()), MAX_LOGGED_BODY)
        )));
    }
    serde_json::from_slice(response.body()).map_err(|e| {
        Neo4jError::protocol_error(format!(
            "couldn't parse response body ({e}): {}",
            abbreviate(&String::from_utf8_lossy(response.body()), MAX_LOGGED_BODY)
        ))
    })
}

#[cfg(test)]
mod tests {
    use rstest::*;
    use serde_json::json;

    use super::super::test_util::json_response;
    use super::*;
    use crate::{value_map, ErrorKind, ValueReceive};

    #[rstest]
    fn test_request_body_shape() {
        let statements = vec![
            Statement::new("RETURN 1"),
            Statement::new("RETURN $x").with_parameters(value_map!({"x": 1})),
        ];
        let body: serde_json::Value =
            serde_json::from_slice(&request_body(&statements, &[]).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "statements": [
                    {"statement": "RETURN 1"},
                    {"statement": "RETURN $x", "parameters": {"x": 1}},
                ],
                "resultDataContents": [],
                "includeStats": false,
            })
        );
    }

    #[rstest]
    fn test_request_body_bookmarks() {
        let body: serde_json::Value = serde_json::from_slice(
            &request_body(&[Statement::new("RETURN 1")], &["bm:1".into()]).unwrap(),
        )
        .unwrap();
        assert_eq!(body["bookmarks"], json!(["bm:1"]));
    }

    #[rstest]
    fn test_results_in_order() {
        let response = json_response(
            200,
            json!({
                "results": [
                    {"columns": ["a"], "data": [{"row": [1]}, {"row": [2]}]},
                    {"columns": ["b"], "data": [{"row": ["x"]}]},
                ],
                "errors": [],
                "lastBookmarks": ["bm:42"],
            }),
        );
        let body: ResponseBody = interpret_response(&response).unwrap();
        let batch = body.into_batch().unwrap();
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].columns(), ["a"]);
        assert_eq!(
            batch.results[0].rows(),
            [vec![ValueReceive::Integer(1)], vec![ValueReceive::Integer(2)]]
        );
        assert_eq!(batch.results[1].rows(), [vec![ValueReceive::String("x".into())]]);
        assert_eq!(batch.bookmark.as_deref(), Some("bm:42"));
    }

    #[rstest]
    fn test_errors_in_body() {
        let response = json_response(
            200,
            json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input",
                }],
            }),
        );
        let body: ResponseBody = interpret_response(&response).unwrap();
        let err = body.into_batch().unwrap_err();
        let server_error = err.server_error().unwrap();
        assert_eq!(server_error.code(), "Neo.ClientError.Statement.SyntaxError");
        assert!(!err.is_retryable());
    }

    #[rstest]
    #[case(404, "not found")]
    #[case(500, "")]
    #[case(200, "<html>")]
    fn test_protocol_errors(#[case] status: u16, #[case] body: &str) {
        let response = HttpResponse::new(status, body);
        let err = interpret_response::<ResponseBody>(&response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[rstest]
    fn test_non_2xx_with_server_error() {
        let response = json_response(
            503,
            json!({"errors": [{
                "code": "Neo.TransientError.General.DatabaseUnavailable",
                "message": "try again",
            }]}),
        );
        let err = interpret_response::<ResponseBody>(&response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.is_retryable());
    }
}
