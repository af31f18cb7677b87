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

mod config;

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::mem;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use super::formatter::{BasicFormatter, ResultFormatter};
use super::io::{ChannelOps, Connection, ResultBatch};
use super::session::SessionState;
use super::statement::Statement;
use crate::{Neo4jError, Result, ValueSend};
pub use config::TransactionConfig;

/// Lifecycle of an explicit [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
    /// The server or the connection reported an error. The server has discarded the
    /// transaction.
    Failed,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Failed => "failed",
        })
    }
}

/// An explicit transaction bound to one connection.
///
/// Created by [`Session::begin_transaction()`](crate::session::Session::begin_transaction).
/// Once committed, rolled back, or failed, every further statement is rejected with
/// [`Neo4jError::TransactionState`].
/// Dropping a transaction that is still open rolls it back. Errors during that rollback are only
/// logged.
pub struct Transaction<F: ResultFormatter = BasicFormatter> {
    connection: Connection,
    formatter: Arc<F>,
    session: Arc<Mutex<SessionState>>,
    state: TransactionState,
    initial_results: Vec<F::Output>,
}

impl<F: ResultFormatter> Transaction<F> {
    pub(crate) fn new(
        connection: Connection,
        formatter: Arc<F>,
        session: Arc<Mutex<SessionState>>,
    ) -> Self {
        Self {
            connection,
            formatter,
            session,
            state: TransactionState::Open,
            initial_results: Vec::new(),
        }
    }

    pub(crate) fn with_initial_results(mut self, initial_results: Vec<F::Output>) -> Self {
        self.initial_results = initial_results;
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The connection (and with it the server) this transaction runs on.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Results of the statements passed when beginning the transaction.
    ///
    /// Hands them out only once; subsequent calls return an empty list.
    pub fn take_initial_results(&mut self) -> Vec<F::Output> {
        mem::take(&mut self.initial_results)
    }

    pub fn run(
        &mut self,
        query: impl Into<String>,
        parameters: HashMap<String, ValueSend>,
    ) -> Result<F::Output> {
        self.run_statement(Statement::new(query).with_parameters(parameters))
    }

    pub fn run_statement(&mut self, statement: Statement) -> Result<F::Output> {
        let results = self.run_statements(&[statement])?;
        single_result(results)
    }

    /// Send all `statements` in one request. Results come back in the same order.
    pub fn run_statements(&mut self, statements: &[Statement]) -> Result<Vec<F::Output>> {
        self.ensure_open()?;
        let batch = self.connection.channel.run(statements);
        let batch = self.track_failure(batch)?;
        format_batch(self.formatter.as_ref(), batch)
    }

    /// Run the final `statements` (may be empty) and commit.
    ///
    /// The bookmark of the commit is recorded in the session.
    pub fn commit(&mut self, statements: &[Statement]) -> Result<Vec<F::Output>> {
        self.ensure_open()?;
        let batch = self.connection.channel.commit(statements);
        let batch = self.track_failure(batch)?;
        self.finish(TransactionState::Committed);
        if let Some(bookmark) = &batch.bookmark {
            self.session.lock().record_bookmark(bookmark.clone());
        }
        format_batch(self.formatter.as_ref(), batch)
    }

    /// Roll back the transaction.
    ///
    /// Rolling back a failed transaction is a no-op as the server already discarded it.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Open => {
                let res = self.connection.channel.rollback();
                self.finish(TransactionState::RolledBack);
                res
            }
            TransactionState::Failed => Ok(()),
            state => Err(Neo4jError::transaction_state(format!(
                "cannot roll back a transaction that is {state}"
            ))),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            state => Err(Neo4jError::transaction_state(format!(
                "transaction is {state} and accepts no further statements"
            ))),
        }
    }

    fn track_failure(&mut self, batch: Result<ResultBatch>) -> Result<ResultBatch> {
        if batch.is_err() {
            self.finish(TransactionState::Failed);
        }
        batch
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.session.lock().transaction_open = false;
    }
}

impl<F: ResultFormatter> Debug for Transaction<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.connection)
            .field("formatter", &self.formatter)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<F: ResultFormatter> Drop for Transaction<F> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            if let Err(err) = self.rollback() {
                info!("ignoring failure during rollback of dropped transaction: {err}");
            }
        }
    }
}

/// The handle passed to transaction functions.
///
/// Committing and rolling back is up to the function's caller: return `Ok` to commit and `Err`
/// to roll back.
pub struct ManagedTransaction<'tx, F: ResultFormatter = BasicFormatter> {
    inner: &'tx mut Transaction<F>,
}

impl<'tx, F: ResultFormatter> ManagedTransaction<'tx, F> {
    pub(crate) fn new(inner: &'tx mut Transaction<F>) -> Self {
        Self { inner }
    }

    pub fn run(
        &mut self,
        query: impl Into<String>,
        parameters: HashMap<String, ValueSend>,
    ) -> Result<F::Output> {
        self.inner.run(query, parameters)
    }

    pub fn run_statement(&mut self, statement: Statement) -> Result<F::Output> {
        self.inner.run_statement(statement)
    }

    pub fn run_statements(&mut self, statements: &[Statement]) -> Result<Vec<F::Output>> {
        self.inner.run_statements(statements)
    }

    pub fn connection(&self) -> &Connection {
        self.inner.connection()
    }
}

impl<'tx, F: ResultFormatter> Debug for ManagedTransaction<'tx, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedTransaction")
            .field("inner", &self.inner)
            .finish()
    }
}

pub(crate) fn format_batch<F: ResultFormatter>(
    formatter: &F,
    batch: ResultBatch,
) -> Result<Vec<F::Output>> {
    batch
        .results
        .into_iter()
        .map(|result| formatter.format(result))
        .collect()
}

pub(crate) fn single_result<T>(results: Vec<T>) -> Result<T> {
    results
        .into_iter()
        .next()
        .ok_or_else(|| Neo4jError::protocol_error("server sent no result for the statement"))
}
