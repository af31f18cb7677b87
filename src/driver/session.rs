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

pub(crate) mod config;
pub(crate) mod retry;

use std::collections::HashMap;
use std::fmt::Debug;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;

use super::config::auth::Authenticate;
use super::formatter::{BasicFormatter, ResultFormatter};
use super::io::{ChannelOps, Connection, ConnectionPool, TransactionParameters};
use super::statement::Statement;
use super::transaction::{
    format_batch, single_result, ManagedTransaction, Transaction, TransactionConfig,
    TransactionState,
};
use crate::uri::Uri;
use crate::{Neo4jError, Result, ValueSend};
pub use config::{AccessMode, SessionConfig};
use retry::RetryPolicy;

/// State shared between a session and the transaction it currently has open.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    bookmarks: Vec<String>,
    pub(crate) transaction_open: bool,
}

impl SessionState {
    pub(crate) fn record_bookmark(&mut self, bookmark: String) {
        self.bookmarks = vec![bookmark];
    }
}

/// Everything a session needs from its driver to acquire connections.
#[derive(Debug, Clone)]
pub(crate) struct SessionContext {
    pub(crate) pool: Arc<dyn ConnectionPool>,
    /// The transactional endpoint (HTTP) or the server's URI (Bolt).
    pub(crate) endpoint: Uri,
    pub(crate) auth: Arc<dyn Authenticate>,
    pub(crate) socket_timeout: Option<Duration>,
    pub(crate) user_agent: Arc<str>,
}

/// A sequence of transactions against one database with one access mode.
///
/// Every transaction acquires its own [`Connection`] from the driver's pool. Bookmarks of
/// committed transactions are sent along with the next one, so each transaction sees the
/// effects of the ones before it.
///
/// At most one explicit [`Transaction`] may be open per session at any time.
#[derive(Debug)]
pub struct Session<F: ResultFormatter = BasicFormatter> {
    context: SessionContext,
    config: SessionConfig,
    formatter: Arc<F>,
    state: Arc<Mutex<SessionState>>,
    closed: bool,
}

impl<F: ResultFormatter> Session<F> {
    pub(crate) fn new(context: SessionContext, config: SessionConfig, formatter: Arc<F>) -> Self {
        let state = SessionState {
            bookmarks: config.bookmarks().to_vec(),
            transaction_open: false,
        };
        Self {
            context,
            config,
            formatter,
            state: Arc::new(Mutex::new(state)),
            closed: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Where the session's transactions are sent.
    pub fn endpoint(&self) -> &Uri {
        &self.context.endpoint
    }

    /// Bookmarks that will be sent with the next transaction.
    pub fn bookmarks(&self) -> Vec<String> {
        self.state.lock().bookmarks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Refuse any further work.
    ///
    /// A transaction begun earlier is owned by the caller and can still be finished. Dropping
    /// it while open rolls it back on a best-effort basis.
    pub fn close(&mut self) {
        debug!("closing session");
        self.closed = true;
    }

    /// Run a single query in an auto-commit transaction.
    pub fn run(
        &mut self,
        query: impl Into<String>,
        parameters: HashMap<String, ValueSend>,
    ) -> Result<F::Output> {
        self.run_statement(Statement::new(query).with_parameters(parameters))
    }

    pub fn run_statement(&mut self, statement: Statement) -> Result<F::Output> {
        let results = self.run_statements(&[statement], &TransactionConfig::default())?;
        single_result(results)
    }

    /// Run all `statements` in one auto-commit transaction. Results come in the same order.
    pub fn run_statements(
        &mut self,
        statements: &[Statement],
        config: &TransactionConfig,
    ) -> Result<Vec<F::Output>> {
        self.ensure_usable()?;
        let mut connection = self.acquire()?;
        let bookmarks = self.bookmarks();
        let parameters = self.transaction_parameters(&bookmarks, config);
        let batch = connection
            .channel
            .run_auto_commit(statements, &parameters)?;
        if let Some(bookmark) = &batch.bookmark {
            self.state.lock().record_bookmark(bookmark.clone());
        }
        format_batch(self.formatter.as_ref(), batch)
    }

    /// Open an explicit transaction, running `statements` (may be empty) right away.
    ///
    /// Their results are available through [`Transaction::take_initial_results()`].
    pub fn begin_transaction(
        &mut self,
        statements: &[Statement],
        config: &TransactionConfig,
    ) -> Result<Transaction<F>> {
        self.ensure_usable()?;
        let mut connection = self.acquire()?;
        let bookmarks = self.bookmarks();
        let parameters = self.transaction_parameters(&bookmarks, config);
        let batch = connection.channel.begin(statements, &parameters)?;
        self.state.lock().transaction_open = true;
        let transaction = Transaction::new(
            connection,
            Arc::clone(&self.formatter),
            Arc::clone(&self.state),
        );
        // on error, dropping the transaction rolls it back
        let initial_results = format_batch(self.formatter.as_ref(), batch)?;
        Ok(transaction.with_initial_results(initial_results))
    }

    /// Run `work` in an explicit transaction once: commit if it returns `Ok`, roll back
    /// otherwise.
    ///
    /// Use [`Session::execute_transaction()`] to retry on transient failures.
    pub fn run_transaction<R>(
        &mut self,
        config: &TransactionConfig,
        work: impl FnOnce(&mut ManagedTransaction<F>) -> Result<R>,
    ) -> Result<R> {
        let mut transaction = self.begin_transaction(&[], config)?;
        let res = work(&mut ManagedTransaction::new(&mut transaction));
        match res {
            Ok(value) => {
                transaction.commit(&[])?;
                Ok(value)
            }
            Err(err) => {
                if transaction.state() == TransactionState::Open {
                    if let Err(rollback_err) = transaction.rollback() {
                        info!("ignoring failure during rollback: {rollback_err}");
                    }
                }
                Err(err)
            }
        }
    }

    /// Like [`Session::run_transaction()`] but repeats the whole transaction under `policy`
    /// as long as it fails with a retryable error.
    ///
    /// **The work may be invoked more than once.** Anything it does outside the transaction
    /// (e.g., sending emails) must be idempotent.
    pub fn execute_transaction<R, P: RetryPolicy>(
        &mut self,
        policy: P,
        config: &TransactionConfig,
        mut work: impl FnMut(&mut ManagedTransaction<F>) -> Result<R>,
    ) -> StdResult<R, P::Error> {
        policy.execute(|| self.run_transaction(config, &mut work))
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(Neo4jError::transaction_state("session is closed"));
        }
        if self.state.lock().transaction_open {
            return Err(Neo4jError::transaction_state(
                "session already has an open transaction",
            ));
        }
        Ok(())
    }

    fn acquire(&self) -> Result<Connection> {
        self.context.pool.acquire(
            &self.context.endpoint,
            &self.context.auth,
            self.context.socket_timeout,
            &self.context.user_agent,
            &self.config,
        )
    }

    fn transaction_parameters<'a>(
        &'a self,
        bookmarks: &'a [String],
        config: &'a TransactionConfig,
    ) -> TransactionParameters<'a> {
        TransactionParameters {
            database: self.config.database(),
            access_mode: self.config.access_mode(),
            bookmarks,
            config,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use serde_json::{json, Value as JsonValue};

    use super::*;
    use crate::driver::config::auth::AuthToken;
    use crate::driver::io::http::test_util::{json_response, mock_server, request_json};
    use crate::driver::io::http::{
        HttpConnectionPool, HttpRequest, HttpResponse, Method, MockHttpClient,
    };

    pub(crate) const ENDPOINT: &str = "http://localhost:7474/db/neo4j/tx";
    pub(crate) const TX_PATH: &str = "/db/neo4j/tx/1";

    /// One result per statement in the request, echoing the statement's text.
    fn echo_results(request: &HttpRequest) -> JsonValue {
        let body = request_json(request);
        let results = body["statements"]
            .as_array()
            .map(|statements| {
                statements
                    .iter()
                    .map(|statement| {
                        json!({
                            "columns": ["statement"],
                            "data": [{"row": [statement["statement"]]}],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        JsonValue::Array(results)
    }

    /// Serves discovery and the transactional endpoint with transaction `1` and hands out
    /// bookmark `bm:<n>` on the n-th commit. Every request is recorded in `log`.
    pub(crate) fn tx_client(log: Arc<Mutex<Vec<HttpRequest>>>) -> MockHttpClient {
        let mut commits = 0;
        mock_server(move |request| {
            log.lock().push(request.clone());
            let path = request.uri().path().to_string();
            match (request.method(), path.as_str()) {
                (Method::Get, "/") => json_response(
                    200,
                    json!({
                        "neo4j_version": "5.3.0",
                        "neo4j_edition": "community",
                        "transaction": "http://localhost:7474/db/{databaseName}/tx",
                    }),
                ),
                (Method::Post, "/db/neo4j/tx/commit") | (Method::Post, "/db/neo4j/tx/1/commit") => {
                    commits += 1;
                    json_response(
                        200,
                        json!({
                            "results": echo_results(request),
                            "errors": [],
                            "lastBookmarks": [format!("bm:{commits}")],
                        }),
                    )
                }
                (Method::Post, "/db/neo4j/tx") => json_response(
                    201,
                    json!({
                        "results": echo_results(request),
                        "errors": [],
                        "commit": "http://localhost:7474/db/neo4j/tx/1/commit",
                    }),
                ),
                (Method::Post, TX_PATH) => json_response(
                    200,
                    json!({"results": echo_results(request), "errors": []}),
                ),
                (Method::Delete, TX_PATH) => {
                    json_response(200, json!({"results": [], "errors": []}))
                }
                _ => HttpResponse::new(404, ""),
            }
        })
    }

    pub(crate) fn tx_server(log: Arc<Mutex<Vec<HttpRequest>>>) -> Arc<HttpConnectionPool> {
        Arc::new(HttpConnectionPool::new(Arc::new(tx_client(log))))
    }

    pub(crate) fn session_with_pool(
        pool: Arc<dyn ConnectionPool>,
        config: SessionConfig,
    ) -> Session {
        let context = SessionContext {
            pool,
            endpoint: Uri::parse(ENDPOINT).unwrap(),
            auth: Arc::new(AuthToken::new_basic_auth("neo4j", "pass")),
            socket_timeout: None,
            user_agent: Arc::from("test/1.0"),
        };
        Session::new(context, config, Arc::new(BasicFormatter))
    }

    pub(crate) fn statement_texts(request: &HttpRequest) -> Vec<String> {
        request_json(request)["statements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|statement| statement["statement"].as_str().unwrap().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::test_util::*;
    use super::*;
    use crate::driver::io::http::test_util::{init_logging, request_json};
    use crate::driver::io::http::{HttpRequest, Method};
    use crate::{ErrorKind, ValueReceive};

    type Log = Arc<Mutex<Vec<HttpRequest>>>;

    #[fixture]
    fn log() -> Log {
        init_logging();
        Default::default()
    }

    fn session(log: &Log) -> Session {
        session_with_pool(tx_server(Arc::clone(log)), SessionConfig::new())
    }

    fn echoed(row: &HashMap<String, ValueReceive>) -> &str {
        match &row["statement"] {
            ValueReceive::String(text) => text,
            value => panic!("unexpected value {value:?}"),
        }
    }

    #[rstest]
    fn test_run_statements_keeps_order(log: Log) {
        let mut session = session(&log);
        let statements = ["RETURN 1", "RETURN 2", "RETURN 3"].map(Statement::from);

        let results = session
            .run_statements(&statements, &TransactionConfig::new())
            .unwrap();

        let texts: Vec<_> = results.iter().map(|rows| echoed(&rows[0])).collect();
        assert_eq!(texts, ["RETURN 1", "RETURN 2", "RETURN 3"]);
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].uri().path(), "/db/neo4j/tx/commit");
        assert_eq!(statement_texts(&log[0]), ["RETURN 1", "RETURN 2", "RETURN 3"]);
    }

    #[rstest]
    fn test_bookmarks_are_chained(log: Log) {
        let mut session = session_with_pool(
            tx_server(Arc::clone(&log)),
            SessionConfig::new().with_bookmarks(vec!["bm:0".into()]),
        );

        session.run("RETURN 1", Default::default()).unwrap();
        assert_eq!(session.bookmarks(), ["bm:1"]);
        session.run("RETURN 2", Default::default()).unwrap();
        assert_eq!(session.bookmarks(), ["bm:2"]);

        let log = log.lock();
        assert_eq!(request_json(&log[0])["bookmarks"], serde_json::json!(["bm:0"]));
        assert_eq!(request_json(&log[1])["bookmarks"], serde_json::json!(["bm:1"]));
    }

    #[rstest]
    fn test_closed_session_rejects_work(log: Log) {
        let mut session = session(&log);
        session.close();

        let err = session.run("RETURN 1", Default::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransactionState);
        assert!(log.lock().is_empty());
    }

    #[rstest]
    fn test_explicit_transaction(log: Log) {
        let mut session = session(&log);

        let mut tx = session
            .begin_transaction(&["RETURN 0".into()], &TransactionConfig::new())
            .unwrap();
        let initial = tx.take_initial_results();
        assert_eq!(echoed(&initial[0][0]), "RETURN 0");
        let rows = tx.run("RETURN 1", Default::default()).unwrap();
        assert_eq!(echoed(&rows[0]), "RETURN 1");
        tx.commit(&["RETURN 2".into()]).unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        drop(tx);

        assert_eq!(session.bookmarks(), ["bm:1"]);
        let paths: Vec<_> = log
            .lock()
            .iter()
            .map(|request| (request.method(), request.uri().path().to_string()))
            .collect();
        assert_eq!(
            paths,
            [
                (Method::Post, String::from("/db/neo4j/tx")),
                (Method::Post, String::from(TX_PATH)),
                (Method::Post, String::from("/db/neo4j/tx/1/commit")),
            ]
        );
    }

    #[rstest]
    fn test_one_open_transaction_per_session(log: Log) {
        let mut session = session(&log);

        let mut tx = session
            .begin_transaction(&[], &TransactionConfig::new())
            .unwrap();
        let err = session
            .begin_transaction(&[], &TransactionConfig::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionState);
        let err = session.run("RETURN 1", Default::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionState);

        tx.rollback().unwrap();
        session.run("RETURN 1", Default::default()).unwrap();
    }

    #[rstest]
    fn test_dropped_transaction_rolls_back(log: Log) {
        let mut session = session(&log);

        let tx = session
            .begin_transaction(&[], &TransactionConfig::new())
            .unwrap();
        drop(tx);

        let log = log.lock();
        let last = log.last().unwrap();
        assert_eq!(last.method(), Method::Delete);
        assert_eq!(last.uri().path(), TX_PATH);
    }

    #[rstest]
    fn test_close_then_drop_open_transaction_rolls_back(log: Log) {
        let mut session = session(&log);

        let tx = session
            .begin_transaction(&[], &TransactionConfig::new())
            .unwrap();
        session.close();
        assert!(session.is_closed());
        drop(tx);

        let log = log.lock();
        let last = log.last().unwrap();
        assert_eq!(last.method(), Method::Delete);
        assert_eq!(last.uri().path(), TX_PATH);
    }

    #[rstest]
    fn test_run_transaction_commits_on_ok(log: Log) {
        let mut session = session(&log);

        let value = session
            .run_transaction(&TransactionConfig::new(), |tx| {
                let rows = tx.run("RETURN 1", Default::default())?;
                Ok(echoed(&rows[0]).to_string())
            })
            .unwrap();

        assert_eq!(value, "RETURN 1");
        assert_eq!(log.lock().last().unwrap().uri().path(), "/db/neo4j/tx/1/commit");
    }

    #[rstest]
    fn test_run_transaction_rolls_back_on_err(log: Log) {
        let mut session = session(&log);

        let err = session
            .run_transaction(&TransactionConfig::new(), |tx| {
                tx.run("RETURN 1", Default::default())?;
                Err::<(), _>(Neo4jError::user_callback("changed my mind"))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UserCallback);
        assert_eq!(log.lock().last().unwrap().method(), Method::Delete);
        assert!(session.bookmarks().is_empty());
    }
}
