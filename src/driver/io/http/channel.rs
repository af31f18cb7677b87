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

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use log::debug;

use super::wire::{interpret_response, request_body, ResponseBody};
use super::{send, HttpClient, HttpRequest, Method, RequestFactory};
use crate::driver::io::{ChannelOps, ResultBatch, TransactionParameters};
use crate::driver::statement::Statement;
use crate::uri::Uri;
use crate::{Neo4jError, Result};

pub(crate) struct HttpChannel {
    client: Arc<dyn HttpClient>,
    factory: RequestFactory,
    endpoint: Uri,
    transaction: Option<OpenTransaction>,
}

#[derive(Debug)]
struct OpenTransaction {
    uri: Uri,
    headers: Vec<(&'static str, String)>,
}

impl HttpChannel {
    pub(crate) fn new(client: Arc<dyn HttpClient>, factory: RequestFactory, endpoint: Uri) -> Self {
        Self {
            client,
            factory,
            endpoint,
            transaction: None,
        }
    }

    fn post(
        &self,
        uri: &Uri,
        headers: &[(&'static str, String)],
        statements: &[Statement],
        bookmarks: &[String],
    ) -> Result<(ResponseBody, Option<String>)> {
        let request = with_headers(self.factory.create_request(Method::Post, uri), headers)
            .with_body(request_body(statements, bookmarks)?);
        let response = send(self.client.as_ref(), request)?;
        let location = response.header("Location").map(String::from);
        Ok((interpret_response(&response)?, location))
    }

    fn open_transaction(&self) -> Result<&OpenTransaction> {
        self.transaction
            .as_ref()
            .ok_or_else(|| Neo4jError::transaction_state("no transaction is open on this connection"))
    }
}

impl Debug for HttpChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("endpoint", &self.endpoint)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

fn with_headers(mut request: HttpRequest, headers: &[(&'static str, String)]) -> HttpRequest {
    for (name, value) in headers {
        request = request.with_header(*name, value.as_str());
    }
    request
}

fn transaction_headers(parameters: &TransactionParameters<'_>) -> Vec<(&'static str, String)> {
    let mut headers = vec![(
        "access-mode",
        String::from(parameters.access_mode.as_header_value()),
    )];
    if let Some(timeout) = parameters.config.timeout() {
        headers.push(("max-execution-time", timeout.as_millis().to_string()));
    }
    if !parameters.config.metadata().is_empty() {
        debug!("transaction metadata is not supported over HTTP and will be ignored");
    }
    headers
}

/// `POST .../tx` answers with `commit: .../tx/<id>/commit` and a `Location: .../tx/<id>`
/// header. Either identifies the transaction.
fn transaction_uri(
    endpoint: &Uri,
    commit: Option<&str>,
    location: Option<&str>,
) -> Result<Uri> {
    if let Some(commit) = commit {
        return endpoint.resolve(commit.trim_end_matches('/').trim_end_matches("/commit"));
    }
    if let Some(location) = location {
        return endpoint.resolve(location);
    }
    Err(Neo4jError::protocol_error(
        "server opened a transaction without telling where to find it",
    ))
}

impl ChannelOps for HttpChannel {
    fn run_auto_commit(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        let headers = transaction_headers(parameters);
        let uri = self.endpoint.join_path("commit");
        let (body, _) = self
            .post(&uri, &headers, statements, parameters.bookmarks)
            .map_err(Neo4jError::during_commit)?;
        body.into_batch()
    }

    fn begin(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        let headers = transaction_headers(parameters);
        let (body, location) =
            self.post(&self.endpoint, &headers, statements, parameters.bookmarks)?;
        let uri = transaction_uri(&self.endpoint, body.commit.as_deref(), location.as_deref())?;
        debug!("opened transaction {uri}");
        self.transaction = Some(OpenTransaction { uri, headers });
        body.into_batch()
    }

    fn run(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        let transaction = self.open_transaction()?;
        let (body, _) = self.post(&transaction.uri, &transaction.headers, statements, &[])?;
        body.into_batch()
    }

    fn commit(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        let transaction = self.open_transaction()?;
        let uri = transaction.uri.join_path("commit");
        let result = self
            .post(&uri, &transaction.headers, statements, &[])
            .map_err(Neo4jError::during_commit);
        self.transaction = None;
        result?.0.into_batch()
    }

    fn rollback(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };
        let request = with_headers(
            self.factory.create_request(Method::Delete, &transaction.uri),
            &transaction.headers,
        );
        let response = send(self.client.as_ref(), request)?;
        let body: ResponseBody = interpret_response(&response)?;
        body.into_batch().map(|_| ())
    }
}
