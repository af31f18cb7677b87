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
use std::time::Duration;

use crate::ValueSend;

/// Server-side limits and annotations of a single transaction.
///
/// Over HTTP the timeout is sent as `max-execution-time` header (milliseconds) while metadata
/// is not supported by the endpoint and ignored. Over Bolt both end up in the transaction's
/// `extra` as `tx_timeout` and `tx_metadata`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionConfig {
    timeout: Option<Duration>,
    metadata: HashMap<String, ValueSend>,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the server terminate the transaction once it runs longer than `timeout`.
    ///
    /// Sub-millisecond parts are rounded up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use the server's configured default timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, ValueSend>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn metadata(&self) -> &HashMap<String, ValueSend> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::value_map;

    #[rstest]
    fn test_builder() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(2))
            .with_metadata(value_map!({"app": "test"}));
        assert_eq!(config.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.metadata()["app"], ValueSend::from("test"));

        let config = config.without_timeout();
        assert_eq!(config.timeout(), None);
        assert_eq!(config.metadata().len(), 1);
    }

    #[rstest]
    fn test_default_is_empty() {
        let config = TransactionConfig::default();
        assert_eq!(config.timeout(), None);
        assert!(config.metadata().is_empty());
    }
}
