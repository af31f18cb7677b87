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

use duplicate::duplicate_item;
use serde::{Serialize, Serializer};

/// A query parameter.
///
/// Only scalars, lists, nested maps, and null can be sent. Every transport can encode all of
/// them.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValueSend {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ValueSend>),
    Map(HashMap<String, ValueSend>),
}

#[duplicate_item(
    ty         variant;
    [ bool ]   [ Boolean ];
    [ u8 ]     [ Integer ];
    [ u16 ]    [ Integer ];
    [ u32 ]    [ Integer ];
    [ i8 ]     [ Integer ];
    [ i16 ]    [ Integer ];
    [ i32 ]    [ Integer ];
    [ i64 ]    [ Integer ];
    [ f32 ]    [ Float ];
    [ f64 ]    [ Float ];
    [ &str ]   [ String ];
    [ String ] [ String ];
)]
impl From<ty> for ValueSend {
    fn from(value: ty) -> Self {
        ValueSend::variant(value.into())
    }
}

impl<T: Into<ValueSend>> From<HashMap<String, T>> for ValueSend {
    fn from(value: HashMap<String, T>) -> Self {
        ValueSend::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<ValueSend>> From<Vec<T>> for ValueSend {
    fn from(value: Vec<T>) -> Self {
        ValueSend::List(value.into_iter().map(|v| v.into()).collect())
    }
}

impl<T: Into<ValueSend>> From<Option<T>> for ValueSend {
    fn from(value: Option<T>) -> Self {
        match value {
            None => ValueSend::Null,
            Some(v) => v.into(),
        }
    }
}

impl Serialize for ValueSend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValueSend::Null => serializer.serialize_unit(),
            ValueSend::Boolean(v) => serializer.serialize_bool(*v),
            ValueSend::Integer(v) => serializer.serialize_i64(*v),
            ValueSend::Float(v) => serializer.serialize_f64(*v),
            ValueSend::String(v) => serializer.serialize_str(v),
            ValueSend::List(v) => serializer.collect_seq(v),
            ValueSend::Map(v) => serializer.collect_map(v),
        }
    }
}
