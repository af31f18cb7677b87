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

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::io;

use itertools::Itertools;
use log::info;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Every failure the client reports.
///
/// Use [`Neo4jError::kind()`] to branch on the failure category and
/// [`Neo4jError::is_retryable()`] to decide whether repeating the unit of work might succeed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Neo4jError {
    /// The URI's scheme does not map to any transport.
    #[error(
        "unsupported scheme: {scheme}, available schemes are: {}",
        .supported.iter().join(",")
    )]
    #[non_exhaustive]
    UnsupportedScheme {
        scheme: String,
        supported: Vec<&'static str>,
    },
    /// used when
    ///  * the driver or session configuration cannot be used
    ///    (e.g., a URI without host, an unknown alias).
    ///  * a parameter cannot be sent over the negotiated transport.
    #[error("invalid configuration: {message}")]
    #[non_exhaustive]
    InvalidConfig { message: String },
    /// Locating the transactional endpoint failed.
    ///
    /// Not cached by the driver: the next session creation starts discovery from scratch.
    #[error("discovery failed: {message}")]
    #[non_exhaustive]
    Discovery {
        message: String,
        #[source]
        source: Option<Box<Neo4jError>>,
    },
    /// used when
    ///  * Experiencing a connectivity error.
    ///    E.g., not able to connect, a broken socket, a timed out HTTP request.
    #[error("connection failed: {message}")]
    #[non_exhaustive]
    Disconnect {
        message: String,
        #[source]
        source: Option<BoxError>,
        /// Whether the error occurred while committing. In this case the outcome of the
        /// transaction is unknown and it will not be retried.
        during_commit: bool,
    },
    /// The server answered with something that cannot be interpreted: a non-2xx status without
    /// error details, an unparsable body, or an unexpected Bolt message.
    #[error(
        "the client encountered a protocol violation, \
        this is likely a bug in the client or the server: {message}"
    )]
    #[non_exhaustive]
    ProtocolError { message: String },
    /// The server reported an error.
    #[error("{error}")]
    #[non_exhaustive]
    ServerError { error: ServerError },
    /// A statement was submitted to a transaction that already reached a terminal state, or a
    /// session was used in a way its state does not allow.
    ///
    /// This is a programming error and never retried.
    #[error("invalid transaction state: {message}")]
    #[non_exhaustive]
    TransactionState { message: String },
    /// A user-provided callback (e.g., a transaction function) failed with a custom error.
    #[error("user callback failed: {error}")]
    #[non_exhaustive]
    UserCallback { error: BoxError },
}

/// Coarse failure category of a [`Neo4jError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    Configuration,
    Discovery,
    Transport,
    Protocol,
    Server,
    TransactionState,
    UserCallback,
}

impl Neo4jError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Neo4jError::UnsupportedScheme { .. } | Neo4jError::InvalidConfig { .. } => {
                ErrorKind::Configuration
            }
            Neo4jError::Discovery { .. } => ErrorKind::Discovery,
            Neo4jError::Disconnect { .. } => ErrorKind::Transport,
            Neo4jError::ProtocolError { .. } => ErrorKind::Protocol,
            Neo4jError::ServerError { .. } => ErrorKind::Server,
            Neo4jError::TransactionState { .. } => ErrorKind::TransactionState,
            Neo4jError::UserCallback { .. } => ErrorKind::UserCallback,
        }
    }

    /// Whether repeating the whole unit of work might succeed.
    ///
    /// Only transaction functions act on this
    /// (see [`Client::write_transaction()`](crate::Client::write_transaction)).
    pub fn is_retryable(&self) -> bool {
        match self {
            Neo4jError::ServerError { error } => error.is_retryable(),
            Neo4jError::Disconnect { during_commit, .. } => !during_commit,
            _ => false,
        }
    }

    /// Wrap a custom error of a transaction function so it can be returned through the client.
    pub fn user_callback<E: Into<BoxError>>(error: E) -> Self {
        Self::UserCallback {
            error: error.into(),
        }
    }

    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Neo4jError::ServerError { error } => Some(error),
            _ => None,
        }
    }

    pub(crate) fn read_err(err: io::Error) -> Self {
        info!("read error: {}", err);
        Self::Disconnect {
            message: String::from("failed to read"),
            source: Some(Box::new(err)),
            during_commit: false,
        }
    }

    pub(crate) fn wrap_read<T>(res: io::Result<T>) -> Result<T> {
        res.map_err(Self::read_err)
    }

    pub(crate) fn write_error(err: io::Error) -> Self {
        info!("write error: {}", err);
        Self::Disconnect {
            message: String::from("failed to write"),
            source: Some(Box::new(err)),
            during_commit: false,
        }
    }

    pub(crate) fn wrap_write<T>(res: io::Result<T>) -> Result<T> {
        res.map_err(Self::write_error)
    }

    pub(crate) fn connect_error(err: io::Error) -> Self {
        info!("connect error: {}", err);
        Self::Disconnect {
            message: format!("failed to open connection: {}", err),
            source: Some(Box::new(err)),
            during_commit: false,
        }
    }

    pub(crate) fn wrap_connect<T>(res: io::Result<T>) -> Result<T> {
        res.map_err(Self::connect_error)
    }

    pub(crate) fn transport_error<E: Into<BoxError>>(message: String, err: E) -> Self {
        let err = err.into();
        info!("transport error: {}: {}", message, err);
        Self::Disconnect {
            message: format!("{}: {}", message, err),
            source: Some(err),
            during_commit: false,
        }
    }

    pub(crate) fn disconnect<S: Into<String>>(message: S) -> Self {
        Self::Disconnect {
            message: message.into(),
            source: None,
            during_commit: false,
        }
    }

    pub(crate) fn protocol_error<S: Into<String>>(message: S) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn transaction_state<S: Into<String>>(message: S) -> Self {
        Self::TransactionState {
            message: message.into(),
        }
    }

    pub(crate) fn discovery<S: Into<String>>(message: S, source: Option<Neo4jError>) -> Self {
        Self::Discovery {
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Mark a transport failure as having happened while committing.
    pub(crate) fn during_commit(self) -> Self {
        match self {
            Neo4jError::Disconnect {
                message, source, ..
            } => Neo4jError::Disconnect {
                message,
                source,
                during_commit: true,
            },
            err => err,
        }
    }
}

/// An error reported by the server, identified by a code of the shape
/// `Neo.<classification>.<category>.<title>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    code: String,
    message: String,
}

impl ServerError {
    pub fn new(code: String, message: String) -> Self {
        Self { code, message }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("")
    }

    pub fn category(&self) -> &str {
        self.code.split('.').nth(2).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.code.split('.').nth(3).unwrap_or("")
    }

    pub(crate) fn is_retryable(&self) -> bool {
        match self.code() {
            "Neo.ClientError.Cluster.NotALeader"
            | "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase" => true,
            // the transaction was killed on purpose, running it again would defy the intent
            "Neo.TransientError.Transaction.Terminated"
            | "Neo.TransientError.Transaction.LockClientStopped" => false,
            _ => self.classification() == "TransientError",
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "server error {}: {}", self.code, self.message)
    }
}

pub type Result<T> = std::result::Result<T, Neo4jError>;

impl From<ServerError> for Neo4jError {
    fn from(err: ServerError) -> Self {
        Neo4jError::ServerError { error: err }
    }
}
