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

use crate::uri::Uri;

pub(crate) const DEFAULT_DATABASE: &str = "neo4j";

/// Whether a session reads or writes.
///
/// Over HTTP this becomes the `access-mode` header, over Bolt the `mode` of `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    Read,
    #[default]
    Write,
}

impl AccessMode {
    pub(crate) fn as_header_value(&self) -> &'static str {
        match self {
            AccessMode::Read => "READ",
            AccessMode::Write => "WRITE",
        }
    }
}

/// Per-session intent: target database, access mode, and bookmarks.
///
/// Unset values fall back to the URI's `database` query parameter (see [`SessionConfig::merge`])
/// and finally to the defaults (`neo4j`, [`AccessMode::Write`], no bookmarks).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub(crate) database: Option<String>,
    pub(crate) access_mode: Option<AccessMode>,
    pub(crate) bookmarks: Option<Vec<String>>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_default_database(mut self) -> Self {
        self.database = None;
        self
    }

    pub fn with_access_mode(mut self, access_mode: AccessMode) -> Self {
        self.access_mode = Some(access_mode);
        self
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    pub fn without_bookmarks(mut self) -> Self {
        self.bookmarks = None;
        self
    }

    /// Session defaults embedded in a URI, e.g., `http://localhost:7474?database=movies`.
    pub fn from_uri(uri: &Uri) -> Self {
        Self {
            database: uri
                .query_param("database")
                .filter(|database| !database.is_empty())
                .map(String::from),
            ..Self::default()
        }
    }

    /// Fill every value not set on `self` from `fallback`.
    pub fn merge(self, fallback: &SessionConfig) -> Self {
        Self {
            database: self.database.or_else(|| fallback.database.clone()),
            access_mode: self.access_mode.or(fallback.access_mode),
            bookmarks: self.bookmarks.or_else(|| fallback.bookmarks.clone()),
        }
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode.unwrap_or_default()
    }

    pub fn bookmarks(&self) -> &[String] {
        self.bookmarks.as_deref().unwrap_or(&[])
    }
}

impl AsRef<SessionConfig> for SessionConfig {
    #[inline]
    fn as_ref(&self) -> &SessionConfig {
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.database(), "neo4j");
        assert_eq!(config.access_mode(), AccessMode::Write);
        assert!(config.bookmarks().is_empty());
    }

    #[rstest]
    #[case("http://localhost:7474?database=movies", Some("movies"))]
    #[case("http://localhost:7474?foo=bar&database=movies", Some("movies"))]
    #[case("http://localhost:7474?database=", None)]
    #[case("http://localhost:7474", None)]
    fn test_from_uri(#[case] uri: &str, #[case] database: Option<&str>) {
        let config = SessionConfig::from_uri(&Uri::parse(uri).unwrap());
        assert_eq!(config.database.as_deref(), database);
    }

    #[rstest]
    fn test_merge_caller_wins() {
        let from_uri = SessionConfig::new().with_database("uri_db");
        let config = SessionConfig::new()
            .with_database("caller_db")
            .with_access_mode(AccessMode::Read)
            .merge(&from_uri);
        assert_eq!(config.database(), "caller_db");
        assert_eq!(config.access_mode(), AccessMode::Read);
    }

    #[rstest]
    fn test_merge_uri_is_fallback() {
        let from_uri = SessionConfig::new().with_database("uri_db");
        let config = SessionConfig::new().merge(&from_uri);
        assert_eq!(config.database(), "uri_db");
        assert_eq!(config.access_mode(), AccessMode::Write);
    }
}
