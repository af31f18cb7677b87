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

mod channel;
pub(crate) mod discovery;
mod pool;
pub(crate) mod wire;

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use log::trace;
#[cfg(test)]
use mockall::automock;

use crate::driver::config::auth::Authenticate;
use crate::uri::Uri;
use crate::{Neo4jError, Result};
pub(crate) use channel::HttpChannel;
pub use pool::HttpConnectionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Set a header, replacing previous values of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// The pluggable HTTP transport: send a request, get a response.
///
/// Failing to get any response must be reported as [`Neo4jError::Disconnect`]. Non-2xx
/// responses are not errors at this level.
#[cfg_attr(test, automock)]
pub trait HttpClient: Send + Sync {
    fn send_request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

impl Debug for dyn HttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("HttpClient")
    }
}

/// Default [`HttpClient`] backed by reqwest's blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// `timeout` bounds every request from connecting until the body has been read.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Neo4jError::invalid_config(format!("couldn't build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn send_request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let url = request.uri().to_string();
        let mut builder = self.client.request(method, url.as_str());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().map_err(|e| {
            Neo4jError::transport_error(format!("{} {} failed", request.method, url), e)
        })?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (String::from(name.as_str()), String::from(value)))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| {
                Neo4jError::transport_error(format!("reading response of {url} failed"), e)
            })?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builds requests against the transactional endpoint: JSON headers, user agent, and
/// credentials.
#[derive(Debug, Clone)]
pub(crate) struct RequestFactory {
    auth: Arc<dyn Authenticate>,
    user_agent: Arc<str>,
}

impl RequestFactory {
    pub(crate) fn new(auth: Arc<dyn Authenticate>, user_agent: &str) -> Self {
        Self {
            auth,
            user_agent: Arc::from(user_agent),
        }
    }

    pub(crate) fn create_request(&self, method: Method, uri: &Uri) -> HttpRequest {
        let request = HttpRequest::new(method, uri.without_user_info())
            .with_header("Accept", "application/json;charset=UTF-8")
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", self.user_agent.as_ref());
        self.auth.authenticate_http(request, uri)
    }
}

/// Send and log one request.
pub(crate) fn send(client: &dyn HttpClient, request: HttpRequest) -> Result<HttpResponse> {
    trace!(
        "C: {} {} {}",
        request.method(),
        request.uri(),
        request
            .body()
            .map(String::from_utf8_lossy)
            .unwrap_or_default()
    );
    let response = client.send_request(request)?;
    trace!(
        "S: {} {}",
        response.status(),
        String::from_utf8_lossy(response.body())
    );
    Ok(response)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use serde_json::{json, Value as JsonValue};

    use super::*;
    use crate::driver::config::auth::AuthToken;

    pub(crate) fn json_response(status: u16, body: JsonValue) -> HttpResponse {
        HttpResponse::new(status, serde_json::to_vec(&body).unwrap())
    }

    pub(crate) fn request_json(request: &HttpRequest) -> JsonValue {
        serde_json::from_slice(request.body().expect("request without body")).unwrap()
    }

    pub(crate) fn factory() -> RequestFactory {
        RequestFactory::new(Arc::new(AuthToken::new_basic_auth("neo4j", "pass")), "test/1.0")
    }

    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn is_components_query(request: &HttpRequest) -> bool {
        request
            .body()
            .and_then(|body| std::str::from_utf8(body).ok())
            .map(|body| body.contains("dbms.components"))
            .unwrap_or_default()
    }

    pub(crate) fn components_response() -> HttpResponse {
        json_response(
            200,
            json!({
                "results": [{
                    "columns": ["name", "version", "edition"],
                    "data": [{"row": ["neo4j", "5.3.0", "community"]}],
                }],
                "errors": [],
            }),
        )
    }

    /// A server answering `CALL dbms.components()` like Neo4j 5.3.0 community edition and
    /// everything else with `handler`.
    pub(crate) fn mock_server(
        mut handler: impl FnMut(&HttpRequest) -> HttpResponse + Send + 'static,
    ) -> MockHttpClient {
        let mut client = MockHttpClient::new();
        client.expect_send_request().returning(move |request| {
            if is_components_query(&request) {
                return Ok(components_response());
            }
            Ok(handler(&request))
        });
        client
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::test_util::*;
    use super::*;

    #[rstest]
    fn test_factory_headers() {
        let uri = Uri::parse("http://user:pw@localhost:7474/db/neo4j/tx").unwrap();
        let request = factory().create_request(Method::Post, &uri);
        assert_eq!(request.method(), Method::Post);
        assert_eq!(request.uri().to_string(), "http://localhost:7474/db/neo4j/tx");
        assert_eq!(request.uri().username(), None);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("user-agent"), Some("test/1.0"));
        assert!(request.header("Authorization").unwrap().starts_with("Basic "));
    }

    #[rstest]
    fn test_with_header_replaces() {
        let request = HttpRequest::new(Method::Get, Uri::parse("http://localhost").unwrap())
            .with_header("X-Foo", "1")
            .with_header("x-foo", "2");
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.header("X-FOO"), Some("2"));
    }
}
