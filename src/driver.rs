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
pub(crate) mod formatter;
pub(crate) mod io;
pub(crate) mod session;
pub(crate) mod statement;
pub(crate) mod transaction;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::uri::{substitute_database, Scheme, TransportKind, Uri};
use crate::Result;
use config::auth::{AuthToken, Authenticate};
use config::routing_context;
pub use config::{DriverConfig, TlsConfigError};
use formatter::{BasicFormatter, ResultFormatter};
use io::bolt::{BoltConnectionPool, PoolConfig};
use io::http::discovery::discover_transaction_template;
use io::http::{HttpClient, HttpConnectionPool, RequestFactory, ReqwestClient};
use io::ConnectionPool;
use session::{Session, SessionConfig, SessionContext};

pub mod auth {
    pub use super::config::auth::*;
}

/// Where a driver connects to and as whom.
#[derive(Debug, Clone)]
pub struct DriverSetup {
    uri: Uri,
    auth: Option<Arc<dyn Authenticate>>,
    socket_timeout: Option<Duration>,
}

impl DriverSetup {
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            auth: None,
            socket_timeout: None,
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        Uri::parse(uri).map(Self::new)
    }

    /// Without explicit authentication, user info in the URI becomes basic auth.
    pub fn with_auth(mut self, auth: Arc<dyn Authenticate>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_auth_from_uri(mut self) -> Self {
        self.auth = None;
        self
    }

    /// Bound every read and write on the network.
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    pub fn without_socket_timeout(mut self) -> Self {
        self.socket_timeout = None;
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn auth(&self) -> Arc<dyn Authenticate> {
        match &self.auth {
            Some(auth) => Arc::clone(auth),
            None => Arc::new(AuthToken::from_uri(&self.uri)),
        }
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }
}

#[derive(Debug)]
enum Transport {
    Http {
        client: Arc<dyn HttpClient>,
        /// Raw template with `{databaseName}`, discovered on first use.
        transaction_template: Mutex<Option<Arc<str>>>,
    },
    Bolt,
}

/// Creates sessions against one server.
///
/// The transport follows from the URI's scheme (see [`Scheme`]). Over HTTP, the first session
/// discovers the server's transactional endpoint; the result is cached for the driver's
/// lifetime while failures are not.
#[derive(Debug)]
pub struct Driver<F: ResultFormatter = BasicFormatter> {
    setup: DriverSetup,
    scheme: Scheme,
    auth: Arc<dyn Authenticate>,
    user_agent: Arc<str>,
    pool: Arc<dyn ConnectionPool>,
    transport: Transport,
    formatter: Arc<F>,
    uri_defaults: SessionConfig,
}

impl Driver {
    pub fn new(setup: DriverSetup, config: &DriverConfig) -> Result<Self> {
        Self::with_formatter(setup, config, Arc::new(BasicFormatter))
    }
}

impl<F: ResultFormatter> Driver<F> {
    pub fn with_formatter(
        setup: DriverSetup,
        config: &DriverConfig,
        formatter: Arc<F>,
    ) -> Result<Self> {
        let scheme = Scheme::resolve(setup.uri())?;
        let (pool, transport): (Arc<dyn ConnectionPool>, _) = match scheme.transport() {
            TransportKind::Http => {
                let client: Arc<dyn HttpClient> = match &config.http_client {
                    Some(client) => Arc::clone(client),
                    None => Arc::new(ReqwestClient::new(setup.socket_timeout())?),
                };
                let transport = Transport::Http {
                    client: Arc::clone(&client),
                    transaction_template: Mutex::new(None),
                };
                let pool: Arc<dyn ConnectionPool> = Arc::new(HttpConnectionPool::new(client));
                (pool, transport)
            }
            TransportKind::Bolt => {
                let routing_context = if scheme.routing() {
                    Some(routing_context(setup.uri())?)
                } else {
                    None
                };
                let pool = BoltConnectionPool::new(PoolConfig {
                    max_connection_pool_size: config.max_connection_pool_size,
                    connection_timeout: config.connection_timeout,
                    connection_acquisition_timeout: config.connection_acquisition_timeout,
                    tls_config: config.bolt_tls_config(scheme)?,
                    routing_context,
                });
                let pool: Arc<dyn ConnectionPool> = Arc::new(pool);
                (pool, Transport::Bolt)
            }
        };
        debug!("created {scheme} driver for {}", setup.uri());
        Ok(Self {
            auth: setup.auth(),
            uri_defaults: SessionConfig::from_uri(setup.uri()),
            setup,
            scheme,
            user_agent: Arc::from(config.user_agent.as_str()),
            pool,
            transport,
            formatter,
        })
    }

    pub fn setup(&self) -> &DriverSetup {
        &self.setup
    }

    pub fn uri(&self) -> &Uri {
        self.setup.uri()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Open a session. Values missing in `config` fall back to the URI's query parameters
    /// (`?database=`), then to the defaults.
    ///
    /// Over HTTP this discovers the transactional endpoint unless already known.
    pub fn create_session(&self, config: Option<SessionConfig>) -> Result<Session<F>> {
        let config = config.unwrap_or_default().merge(&self.uri_defaults);
        let context = self.session_context(&config)?;
        Ok(Session::new(context, config, Arc::clone(&self.formatter)))
    }

    /// Acquire one connection and release it right away.
    pub fn verify_connectivity(&self) -> Result<()> {
        let config = SessionConfig::new().merge(&self.uri_defaults);
        let context = self.session_context(&config)?;
        let connection = self.pool.acquire(
            &context.endpoint,
            &self.auth,
            self.setup.socket_timeout(),
            &self.user_agent,
            &config,
        )?;
        debug!(
            "verified connectivity to {} ({})",
            connection.server_agent(),
            connection.protocol()
        );
        Ok(())
    }

    fn session_context(&self, config: &SessionConfig) -> Result<SessionContext> {
        let endpoint = match &self.transport {
            Transport::Http {
                client,
                transaction_template,
            } => {
                let template = self.transaction_template(client.as_ref(), transaction_template)?;
                Uri::parse(&substitute_database(&template, config.database()))?
            }
            Transport::Bolt => self.setup.uri().clone(),
        };
        Ok(SessionContext {
            pool: Arc::clone(&self.pool),
            endpoint,
            auth: Arc::clone(&self.auth),
            socket_timeout: self.setup.socket_timeout(),
            user_agent: Arc::clone(&self.user_agent),
        })
    }

    /// The lock is held during discovery, so concurrent callers wait for the first one
    /// instead of discovering in parallel.
    fn transaction_template(
        &self,
        client: &dyn HttpClient,
        cache: &Mutex<Option<Arc<str>>>,
    ) -> Result<Arc<str>> {
        let mut cached = cache.lock();
        if let Some(template) = cached.as_ref() {
            return Ok(Arc::clone(template));
        }
        let factory = RequestFactory::new(Arc::clone(&self.auth), &self.user_agent);
        let template: Arc<str> =
            Arc::from(discover_transaction_template(client, &factory, self.setup.uri())?);
        *cached = Some(Arc::clone(&template));
        Ok(template)
    }
}
