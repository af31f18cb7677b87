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

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use uriparse::URI;

use crate::address::{Address, DEFAULT_BOLT_PORT, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::{Neo4jError, Result};

/// Every scheme the client understands, in the order they are reported to the user.
pub const SUPPORTED_SCHEMES: [&str; 8] = [
    "bolt",
    "bolt+s",
    "bolt+ssc",
    "neo4j",
    "neo4j+s",
    "neo4j+ssc",
    "http",
    "https",
];

/// The wire protocol a [`Scheme`] maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Bolt,
}

/// How a scheme asks for the connection to be encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeEncryption {
    None,
    /// Verify the server against trusted certificate authorities.
    Trusted,
    /// Accept any certificate.
    SelfSigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Bolt,
    BoltS,
    BoltSsc,
    Neo4j,
    Neo4jS,
    Neo4jSsc,
    Http,
    Https,
}

impl Scheme {
    /// Map the URI's scheme to a transport or fail with [`Neo4jError::UnsupportedScheme`].
    pub fn resolve(uri: &Uri) -> Result<Self> {
        uri.scheme().parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Bolt => "bolt",
            Scheme::BoltS => "bolt+s",
            Scheme::BoltSsc => "bolt+ssc",
            Scheme::Neo4j => "neo4j",
            Scheme::Neo4jS => "neo4j+s",
            Scheme::Neo4jSsc => "neo4j+ssc",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Scheme::Http | Scheme::Https => TransportKind::Http,
            _ => TransportKind::Bolt,
        }
    }

    /// `neo4j` schemes announce a routing context to the server.
    pub fn routing(&self) -> bool {
        matches!(self, Scheme::Neo4j | Scheme::Neo4jS | Scheme::Neo4jSsc)
    }

    pub fn encryption(&self) -> SchemeEncryption {
        match self {
            Scheme::Bolt | Scheme::Neo4j | Scheme::Http => SchemeEncryption::None,
            Scheme::BoltS | Scheme::Neo4jS | Scheme::Https => SchemeEncryption::Trusted,
            Scheme::BoltSsc | Scheme::Neo4jSsc => SchemeEncryption::SelfSigned,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => DEFAULT_HTTP_PORT,
            Scheme::Https => DEFAULT_HTTPS_PORT,
            _ => DEFAULT_BOLT_PORT,
        }
    }
}

impl FromStr for Scheme {
    type Err = Neo4jError;

    fn from_str(scheme: &str) -> Result<Self> {
        Ok(match scheme.to_ascii_lowercase().as_str() {
            "bolt" => Scheme::Bolt,
            "bolt+s" => Scheme::BoltS,
            "bolt+ssc" => Scheme::BoltSsc,
            "neo4j" => Scheme::Neo4j,
            "neo4j+s" => Scheme::Neo4jS,
            "neo4j+ssc" => Scheme::Neo4jSsc,
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => {
                return Err(Neo4jError::UnsupportedScheme {
                    scheme: String::from(scheme),
                    supported: SUPPORTED_SCHEMES.to_vec(),
                })
            }
        })
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, read-only URI.
///
/// Rewrites (e.g., [`Uri::with_path()`]) return a new value.
/// The [`Display`] form leaves out user info so it is safe to log and to send as request
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl Uri {
    pub fn parse(uri: &str) -> Result<Self> {
        let parsed = URI::try_from(uri)
            .map_err(|e| Neo4jError::invalid_config(format!("couldn't parse URI {uri}: {e}")))?;
        let authority = parsed
            .authority()
            .ok_or_else(|| Neo4jError::invalid_config(format!("missing host in URI {uri}")))?;
        if parsed.fragment().is_some() {
            return Err(Neo4jError::invalid_config(format!(
                "URI cannot contain a fragment, found: {uri}"
            )));
        }
        Ok(Self {
            scheme: parsed.scheme().as_str().to_ascii_lowercase(),
            username: authority.username().map(|u| u.to_string()),
            password: authority.password().map(|p| p.to_string()),
            host: authority.host().to_string(),
            port: authority.port(),
            path: parsed.path().to_string(),
            query: parsed.query().map(|query| {
                let mut query = query.to_owned();
                query.normalize();
                query.to_string()
            }),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Value of the first `key=value` pair of the query with the given key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_pairs()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
    }

    pub(crate) fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .as_deref()
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
    }

    /// Host and port to connect to, using the scheme's default port if the URI has none.
    pub fn address(&self) -> Address {
        let default_port = self
            .scheme
            .parse::<Scheme>()
            .map(|scheme| scheme.default_port())
            .unwrap_or(DEFAULT_BOLT_PORT);
        (self.host.as_str(), self.port.unwrap_or(default_port)).into()
    }

    pub fn with_path<P: Into<String>>(&self, path: P) -> Self {
        Self {
            path: path.into(),
            query: None,
            ..self.clone()
        }
    }

    /// Append a path segment: `/db/neo4j/tx` joined with `commit` gives `/db/neo4j/tx/commit`.
    pub fn join_path(&self, segment: &str) -> Self {
        let path = format!(
            "{}/{}",
            self.path.trim_end_matches('/'),
            segment.trim_start_matches('/')
        );
        Self {
            path,
            ..self.clone()
        }
    }

    pub fn without_user_info(&self) -> Self {
        Self {
            username: None,
            password: None,
            ..self.clone()
        }
    }

    /// Resolve a reference found in a server response against this URI.
    ///
    /// Absolute references replace the URI, references starting with `/` replace path and
    /// query, anything else is resolved relative to the current path.
    pub fn resolve(&self, reference: &str) -> Result<Self> {
        if reference.contains("://") {
            return Self::parse(reference);
        }
        let (path, query) = match reference.split_once('?') {
            Some((path, query)) => (path, Some(String::from(query))),
            None => (reference, None),
        };
        let path = if path.starts_with('/') {
            String::from(path)
        } else {
            let base = match self.path.rfind('/') {
                Some(pos) => &self.path[..=pos],
                None => "/",
            };
            format!("{base}{path}")
        };
        Ok(Self {
            path,
            query,
            ..self.clone()
        })
    }
}

impl FromStr for Uri {
    type Err = Neo4jError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Uri {
    type Error = Neo4jError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// Replace the literal `{databaseName}` token of a transactional endpoint template.
///
/// Single pass: a database name containing the token is inserted as is.
pub(crate) fn substitute_database(template: &str, database: &str) -> String {
    template.replace("{databaseName}", database)
}
