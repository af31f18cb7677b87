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
use std::fmt::{Debug, Formatter};
use std::result::Result as StdResult;
use std::sync::Arc;

use log::debug;

use crate::driver::formatter::{BasicFormatter, ResultFormatter};
use crate::driver::session::retry::{ExponentialBackoff, RetryError, RetryPolicy};
use crate::driver::session::{AccessMode, SessionConfig};
use crate::driver::statement::Statement;
use crate::driver::transaction::{ManagedTransaction, Transaction, TransactionConfig};
use crate::driver::{Driver, DriverConfig, DriverSetup};
use crate::{Neo4jError, Result, ValueSend};

/// Collects named driver setups and builds a [`Client`].
pub struct ClientBuilder<F: ResultFormatter = BasicFormatter> {
    setups: Vec<(String, DriverSetup)>,
    default_alias: Option<String>,
    config: DriverConfig,
    formatter: Arc<F>,
    retry_policy: ExponentialBackoff,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            setups: Vec::new(),
            default_alias: None,
            config: DriverConfig::default(),
            formatter: Arc::new(BasicFormatter),
            retry_policy: ExponentialBackoff::default(),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ResultFormatter> ClientBuilder<F> {
    /// Register a server under `alias`. Registering an alias again replaces its setup.
    pub fn with_driver(mut self, alias: impl Into<String>, setup: DriverSetup) -> Self {
        let alias = alias.into();
        self.setups.retain(|(existing, _)| existing != &alias);
        self.setups.push((alias, setup));
        self
    }

    /// Alias used when none is given. Defaults to the first registered one.
    pub fn with_default_alias(mut self, alias: impl Into<String>) -> Self {
        self.default_alias = Some(alias.into());
        self
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_formatter<F2: ResultFormatter>(self, formatter: F2) -> ClientBuilder<F2> {
        ClientBuilder {
            setups: self.setups,
            default_alias: self.default_alias,
            config: self.config,
            formatter: Arc::new(formatter),
            retry_policy: self.retry_policy,
        }
    }

    /// Policy of [`Client::write_transaction()`] and friends.
    pub fn with_retry_policy(mut self, retry_policy: ExponentialBackoff) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Create every driver. Fails on the first unusable setup (e.g., an unsupported scheme).
    pub fn build(self) -> Result<Client<F>> {
        let default_alias = match self.default_alias {
            Some(alias) => alias,
            None => match self.setups.first() {
                Some((alias, _)) => alias.clone(),
                None => return Err(Neo4jError::invalid_config("no driver configured")),
            },
        };
        let mut drivers = HashMap::with_capacity(self.setups.len());
        for (alias, setup) in self.setups {
            debug!("creating driver {alias} for {}", setup.uri());
            let driver =
                Driver::with_formatter(setup, &self.config, Arc::clone(&self.formatter))?;
            drivers.insert(alias, driver);
        }
        if !drivers.contains_key(&default_alias) {
            return Err(Neo4jError::invalid_config(format!(
                "default alias {default_alias} has no driver"
            )));
        }
        Ok(Client {
            drivers,
            default_alias,
            retry_policy: self.retry_policy,
        })
    }
}

impl<F: ResultFormatter> Debug for ClientBuilder<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("setups", &self.setups)
            .field("default_alias", &self.default_alias)
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

/// Entry point: runs statements against one of several servers, picked by alias.
///
/// Every call takes an optional alias; `None` means the default alias.
/// Only the transaction functions ([`Client::write_transaction()`],
/// [`Client::read_transaction()`], [`Client::transaction()`]) retry. Everything else reports
/// failures straight away.
#[derive(Debug)]
pub struct Client<F: ResultFormatter = BasicFormatter> {
    drivers: HashMap<String, Driver<F>>,
    default_alias: String,
    retry_policy: ExponentialBackoff,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<F: ResultFormatter> Client<F> {
    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    pub fn has_driver(&self, alias: &str) -> bool {
        self.drivers.contains_key(alias)
    }

    pub fn get_driver(&self, alias: Option<&str>) -> Result<&Driver<F>> {
        let alias = alias.unwrap_or(&self.default_alias);
        self.drivers.get(alias).ok_or_else(|| {
            Neo4jError::invalid_config(format!(
                "no driver for alias {alias}, available aliases are: {}",
                itertools::join(self.drivers.keys(), ",")
            ))
        })
    }

    /// Run a single query in an auto-commit transaction.
    pub fn run(
        &self,
        query: impl Into<String>,
        parameters: HashMap<String, ValueSend>,
        alias: Option<&str>,
    ) -> Result<F::Output> {
        self.run_statement(Statement::new(query).with_parameters(parameters), alias)
    }

    pub fn run_statement(&self, statement: Statement, alias: Option<&str>) -> Result<F::Output> {
        self.get_driver(alias)?
            .create_session(None)?
            .run_statement(statement)
    }

    /// Run all `statements` in one auto-commit transaction. Results come in the same order.
    pub fn run_statements(
        &self,
        statements: &[Statement],
        alias: Option<&str>,
    ) -> Result<Vec<F::Output>> {
        self.get_driver(alias)?
            .create_session(None)?
            .run_statements(statements, &TransactionConfig::default())
    }

    /// Open an explicit transaction, running `statements` (may be empty) right away.
    pub fn begin_transaction(
        &self,
        statements: &[Statement],
        alias: Option<&str>,
        config: Option<TransactionConfig>,
    ) -> Result<Transaction<F>> {
        self.get_driver(alias)?
            .create_session(None)?
            .begin_transaction(statements, &config.unwrap_or_default())
    }

    /// Run `work` in a write transaction: commit if it returns `Ok`, roll back otherwise.
    ///
    /// Retryable failures, from acquiring a connection to committing, start over with a fresh
    /// session and transaction under the client's retry policy.
    /// **`work` may therefore be called more than once.** Anything it does outside the
    /// transaction must be idempotent.
    pub fn write_transaction<R>(
        &self,
        work: impl FnMut(&mut ManagedTransaction<F>) -> Result<R>,
        alias: Option<&str>,
        config: Option<TransactionConfig>,
    ) -> StdResult<R, RetryError> {
        self.retrying_transaction(work, alias, config, Some(AccessMode::Write))
    }

    /// Like [`Client::write_transaction()`] in a read transaction.
    ///
    /// **`work` may be called more than once.**
    pub fn read_transaction<R>(
        &self,
        work: impl FnMut(&mut ManagedTransaction<F>) -> Result<R>,
        alias: Option<&str>,
        config: Option<TransactionConfig>,
    ) -> StdResult<R, RetryError> {
        self.retrying_transaction(work, alias, config, Some(AccessMode::Read))
    }

    /// Like [`Client::write_transaction()`] with the session's default access mode, which is
    /// [`AccessMode::Write`].
    ///
    /// **`work` may be called more than once.**
    pub fn transaction<R>(
        &self,
        work: impl FnMut(&mut ManagedTransaction<F>) -> Result<R>,
        alias: Option<&str>,
        config: Option<TransactionConfig>,
    ) -> StdResult<R, RetryError> {
        self.retrying_transaction(work, alias, config, None)
    }

    fn retrying_transaction<R>(
        &self,
        mut work: impl FnMut(&mut ManagedTransaction<F>) -> Result<R>,
        alias: Option<&str>,
        config: Option<TransactionConfig>,
        access_mode: Option<AccessMode>,
    ) -> StdResult<R, RetryError> {
        let driver = self.get_driver(alias)?;
        let config = config.unwrap_or_default();
        let session_config = SessionConfig {
            access_mode,
            ..SessionConfig::default()
        };
        self.retry_policy.execute(|| {
            let mut session = driver.create_session(Some(session_config.clone()))?;
            session.run_transaction(&config, &mut work)
        })
    }
}
