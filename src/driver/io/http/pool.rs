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
use std::time::Duration;

use log::debug;

use super::wire::{interpret_response, request_body, ResponseBody};
use super::{send, HttpChannel, HttpClient, Method, RequestFactory};
use crate::driver::config::auth::Authenticate;
use crate::driver::formatter::{BasicFormatter, ResultFormatter};
use crate::driver::io::{Channel, Connection, ConnectionPool, ConnectionProtocol};
use crate::driver::session::SessionConfig;
use crate::driver::statement::Statement;
use crate::uri::Uri;
use crate::{Neo4jError, Result, ValueReceive};

const COMPONENTS_QUERY: &str = "CALL dbms.components() \
                                YIELD name, versions, edition \
                                UNWIND versions AS version \
                                RETURN name, version, edition";

/// "Connections" over HTTP are stateless: acquiring one only asks the server who it is.
///
/// The socket timeout is a property of the [`HttpClient`] handed in here, so the one passed to
/// [`ConnectionPool::acquire()`] is ignored.
pub struct HttpConnectionPool {
    client: Arc<dyn HttpClient>,
}

impl HttpConnectionPool {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl Debug for HttpConnectionPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnectionPool").finish_non_exhaustive()
    }
}

impl ConnectionPool for HttpConnectionPool {
    /// `uri` is the transactional endpoint with the database already substituted.
    fn acquire(
        &self,
        uri: &Uri,
        auth: &Arc<dyn Authenticate>,
        _socket_timeout: Option<Duration>,
        user_agent: &str,
        config: &SessionConfig,
    ) -> Result<Connection> {
        let factory = RequestFactory::new(Arc::clone(auth), user_agent);
        let commit_uri = uri.join_path("commit");
        let request = factory
            .create_request(Method::Post, &commit_uri)
            .with_body(request_body(&[Statement::new(COMPONENTS_QUERY)], &[])?);
        let response = send(self.client.as_ref(), request)?;
        let body: ResponseBody = interpret_response(&response)?;
        let component = body
            .into_batch()?
            .results
            .into_iter()
            .next()
            .map(|result| BasicFormatter.format(result))
            .transpose()?
            .and_then(|rows| rows.into_iter().next())
            .ok_or_else(|| Neo4jError::protocol_error("dbms.components() returned no rows"))?;
        let field = |key: &str| match component.get(key) {
            Some(ValueReceive::String(value)) => Ok(value.clone()),
            other => Err(Neo4jError::protocol_error(format!(
                "dbms.components() returned {other:?} as {key}"
            ))),
        };
        let name = field("name")?;
        let edition = field("edition")?;
        let version = field("version")?;
        let agent = format!("{name}-{edition}/{version}");
        debug!("acquired HTTP connection to {uri} ({agent})");
        Ok(Connection::new(
            agent,
            version,
            ConnectionProtocol::Http,
            config,
            Channel::Http(HttpChannel::new(
                Arc::clone(&self.client),
                factory,
                uri.clone(),
            )),
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;
    use serde_json::json;

    use super::super::test_util::*;
    use super::super::MockHttpClient;
    use super::*;
    use crate::driver::config::auth::AuthToken;
    use crate::driver::session::config::AccessMode;
    use crate::ErrorKind;

    fn components_response() -> serde_json::Value {
        json!({
            "results": [{
                "columns": ["name", "version", "edition"],
                "data": [{"row": ["neo4j", "5.3.0", "community"]}],
            }],
            "errors": [],
        })
    }

    fn acquire(client: MockHttpClient, config: &SessionConfig) -> Result<Connection> {
        let pool = HttpConnectionPool::new(Arc::new(client));
        let auth: Arc<dyn Authenticate> = Arc::new(AuthToken::new_basic_auth("neo4j", "pass"));
        let uri = Uri::parse("http://localhost:7474/db/movies/tx").unwrap();
        pool.acquire(&uri, &auth, None, "test/1.0", config)
    }

    #[rstest]
    fn test_acquire_reads_server_agent() {
        init_logging();
        let mut client = MockHttpClient::new();
        client
            .expect_send_request()
            .withf(|request| {
                let body = request_json(request);
                request.method() == Method::Post
                    && request.uri().path() == "/db/movies/tx/commit"
                    && body["statements"][0]["statement"]
                        .as_str()
                        .unwrap()
                        .starts_with("CALL dbms.components()")
                    && request.header("User-Agent") == Some("test/1.0")
            })
            .times(1)
            .returning(|_| Ok(json_response(200, components_response())));

        let config = SessionConfig::new()
            .with_database("movies")
            .with_access_mode(AccessMode::Read);
        let connection = acquire(client, &config).unwrap();
        assert_eq!(connection.server_agent(), "neo4j-community/5.3.0");
        assert_eq!(connection.server_version(), "5.3.0");
        assert_eq!(connection.protocol(), ConnectionProtocol::Http);
        assert_eq!(connection.access_mode(), AccessMode::Read);
        assert_eq!(connection.database_info().name(), "movies");
    }

    #[rstest]
    fn test_acquire_without_rows() {
        let mut client = MockHttpClient::new();
        client.expect_send_request().times(1).returning(|_| {
            Ok(json_response(
                200,
                json!({"results": [{"columns": ["name", "version", "edition"], "data": []}]}),
            ))
        });

        let err = acquire(client, &SessionConfig::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[rstest]
    fn test_acquire_auth_failure() {
        let mut client = MockHttpClient::new();
        client.expect_send_request().times(1).returning(|_| {
            Ok(json_response(
                401,
                json!({"errors": [{
                    "code": "Neo.ClientError.Security.Unauthorized",
                    "message": "Invalid username or password.",
                }]}),
            ))
        });

        let err = acquire(client, &SessionConfig::new()).unwrap_err();
        assert_eq!(
            err.server_error().unwrap().code(),
            "Neo.ClientError.Security.Unauthorized"
        );
    }
}
