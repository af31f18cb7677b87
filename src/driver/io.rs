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

pub(crate) mod bolt;
pub(crate) mod http;

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use enum_dispatch::enum_dispatch;

use super::config::auth::Authenticate;
use super::formatter::RawResult;
use super::session::config::AccessMode;
use super::session::SessionConfig;
use super::statement::Statement;
use super::transaction::TransactionConfig;
use crate::uri::Uri;
use crate::Result;
use bolt::BoltChannel;
use http::HttpChannel;

/// Hands out live [`Connection`]s for one transport.
///
/// Implementations must tolerate concurrent `acquire` calls.
pub trait ConnectionPool: Debug + Send + Sync {
    /// Open (or reuse) a connection to the server behind `uri` and negotiate the server's
    /// identity. Never retries: failures go straight to the caller.
    fn acquire(
        &self,
        uri: &Uri,
        auth: &Arc<dyn Authenticate>,
        socket_timeout: Option<Duration>,
        user_agent: &str,
        config: &SessionConfig,
    ) -> Result<Connection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionProtocol {
    Http,
    Bolt { major: u8, minor: u8 },
}

impl Display for ConnectionProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionProtocol::Http => f.write_str("HTTP"),
            ConnectionProtocol::Bolt { major, minor } => write!(f, "Bolt {major}.{minor}"),
        }
    }
}

/// The logical database a connection works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseInfo {
    name: String,
}

impl DatabaseInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A usable channel to exactly one server, owned by one session or transaction at a time.
#[derive(Debug)]
pub struct Connection {
    server_agent: String,
    server_version: String,
    protocol: ConnectionProtocol,
    access_mode: AccessMode,
    database_info: DatabaseInfo,
    pub(crate) channel: Channel,
}

impl Connection {
    pub(crate) fn new(
        server_agent: String,
        server_version: String,
        protocol: ConnectionProtocol,
        config: &SessionConfig,
        channel: Channel,
    ) -> Self {
        Self {
            server_agent,
            server_version,
            protocol,
            access_mode: config.access_mode(),
            database_info: DatabaseInfo::new(config.database()),
            channel,
        }
    }

    /// E.g., `neo4j-community/5.3.0` over HTTP or `Neo4j/5.3.0` over Bolt.
    pub fn server_agent(&self) -> &str {
        &self.server_agent
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn protocol(&self) -> ConnectionProtocol {
        self.protocol
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn database_info(&self) -> &DatabaseInfo {
        &self.database_info
    }
}

/// How a transaction is opened on the server.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransactionParameters<'a> {
    pub(crate) database: &'a str,
    pub(crate) access_mode: AccessMode,
    pub(crate) bookmarks: &'a [String],
    pub(crate) config: &'a TransactionConfig,
}

/// Results of a batch of statements, in submission order.
#[derive(Debug, Default)]
pub(crate) struct ResultBatch {
    pub(crate) results: Vec<RawResult>,
    pub(crate) bookmark: Option<String>,
}

#[enum_dispatch]
pub(crate) trait ChannelOps {
    /// Begin, run all statements, and commit, in as few round-trips as the transport allows.
    fn run_auto_commit(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch>;

    /// Open an explicit transaction, running `statements` as its first batch.
    fn begin(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch>;

    fn run(&mut self, statements: &[Statement]) -> Result<ResultBatch>;

    fn commit(&mut self, statements: &[Statement]) -> Result<ResultBatch>;

    fn rollback(&mut self) -> Result<()>;
}

#[enum_dispatch(ChannelOps)]
#[derive(Debug)]
pub(crate) enum Channel {
    Http(HttpChannel),
    Bolt(BoltChannel),
}
