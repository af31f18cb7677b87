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

use crate::ValueSend;

/// A Cypher query together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    parameters: HashMap<String, ValueSend>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, ValueSend>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add or replace a single parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ValueSend>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &HashMap<String, ValueSend> {
        &self.parameters
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
