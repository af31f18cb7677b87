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

use super::value_send::ValueSend;

/// A value found in a result row.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValueReceive {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<ValueReceive>),
    Map(HashMap<String, ValueReceive>),
    /// Graph, spatial, and temporal values received over Bolt, kept as raw structure.
    Structure(Structure),
}

/// A PackStream structure the client does not interpret further.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub tag: u8,
    pub fields: Vec<ValueReceive>,
}

impl ValueReceive {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ValueReceive::Null)
    }
}

#[duplicate_item(
    ty                                  variant;
    [ bool ]                            [ Boolean ];
    [ i64 ]                             [ Integer ];
    [ f64 ]                             [ Float ];
    [ Vec<u8> ]                         [ Bytes ];
    [ String ]                          [ String ];
    [ Vec<ValueReceive> ]               [ List ];
    [ HashMap<String, ValueReceive> ]   [ Map ];
)]
impl TryFrom<ValueReceive> for ty {
    type Error = ValueReceive;

    #[inline]
    fn try_from(value: ValueReceive) -> Result<Self, Self::Error> {
        match value {
            ValueReceive::variant(v) => Ok(v),
            _ => Err(value),
        }
    }
}

#[duplicate_item(
    ty         variant      is_fn          as_fn          try_into_fn;
    [ bool ]   [ Boolean ]  [ is_bool ]    [ as_bool ]    [ try_into_bool ];
    [ i64 ]    [ Integer ]  [ is_int ]     [ as_int ]     [ try_into_int ];
    [ f64 ]    [ Float ]    [ is_float ]   [ as_float ]   [ try_into_float ];
)]
impl ValueReceive {
    #[inline]
    pub fn is_fn(&self) -> bool {
        matches!(self, ValueReceive::variant(_))
    }

    #[inline]
    pub fn as_fn(&self) -> Option<ty> {
        match self {
            ValueReceive::variant(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[allow(clippy::result_large_err)]
    pub fn try_into_fn(self) -> Result<ty, Self> {
        self.try_into()
    }
}

#[duplicate_item(
    ty                                  variant      is_fn          as_fn          try_into_fn;
    [ Vec<u8> ]                         [ Bytes ]    [ is_bytes ]   [ as_bytes ]   [ try_into_bytes ];
    [ String ]                          [ String ]   [ is_string ]  [ as_string ]  [ try_into_string ];
    [ Vec<ValueReceive> ]               [ List ]     [ is_list ]    [ as_list ]    [ try_into_list ];
    [ HashMap<String, ValueReceive> ]   [ Map ]      [ is_map ]     [ as_map ]     [ try_into_map ];
)]
impl ValueReceive {
    #[inline]
    pub fn is_fn(&self) -> bool {
        matches!(self, ValueReceive::variant(_))
    }

    #[inline]
    pub fn as_fn(&self) -> Option<&ty> {
        match self {
            ValueReceive::variant(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    #[allow(clippy::result_large_err)]
    pub fn try_into_fn(self) -> Result<ty, Self> {
        self.try_into()
    }
}

impl From<serde_json::Value> for ValueReceive {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ValueReceive::Null,
            serde_json::Value::Bool(v) => ValueReceive::Boolean(v),
            serde_json::Value::Number(v) => match v.as_i64() {
                Some(v) => ValueReceive::Integer(v),
                None => ValueReceive::Float(v.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(v) => ValueReceive::String(v),
            serde_json::Value::Array(v) => {
                ValueReceive::List(v.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(v) => {
                ValueReceive::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<ValueSend> for ValueReceive {
    fn from(value: ValueSend) -> Self {
        match value {
            ValueSend::Null => ValueReceive::Null,
            ValueSend::Boolean(v) => ValueReceive::Boolean(v),
            ValueSend::Integer(v) => ValueReceive::Integer(v),
            ValueSend::Float(v) => ValueReceive::Float(v),
            ValueSend::String(v) => ValueReceive::String(v),
            ValueSend::List(v) => ValueReceive::List(v.into_iter().map(Into::into).collect()),
            ValueSend::Map(v) => {
                ValueReceive::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;
    use serde_json::json;

    use crate::macros::hash_map;

    use super::*;

    #[rstest]
    #[case(json!(null), ValueReceive::Null)]
    #[case(json!(false), ValueReceive::Boolean(false))]
    #[case(json!(42), ValueReceive::Integer(42))]
    #[case(json!(-1.5), ValueReceive::Float(-1.5))]
    #[case(json!("neo4j"), ValueReceive::String("neo4j".into()))]
    #[case(
        json!([1, "a", null]),
        ValueReceive::List(vec![
            ValueReceive::Integer(1),
            ValueReceive::String("a".into()),
            ValueReceive::Null,
        ])
    )]
    #[case(
        json!({"name": "neo4j", "versions": ["5.3.0"]}),
        ValueReceive::Map(hash_map!(
            String::from("name") => ValueReceive::String("neo4j".into()),
            String::from("versions") => ValueReceive::List(vec![
                ValueReceive::String("5.3.0".into())
            ]),
        ))
    )]
    fn test_from_json(#[case] input: serde_json::Value, #[case] expected: ValueReceive) {
        assert_eq!(ValueReceive::from(input), expected);
    }

    #[rstest]
    fn test_accessors() {
        let value = ValueReceive::String("foo".into());
        assert!(value.is_string());
        assert_eq!(value.as_string().map(String::as_str), Some("foo"));
        assert_eq!(value.as_int(), None);
        assert!(!value.is_null());
        assert_eq!(value.try_into_string().unwrap(), "foo");

        let value = ValueReceive::Integer(1);
        assert_eq!(value.as_int(), Some(1));
        assert_eq!(value.try_into_bool(), Err(ValueReceive::Integer(1)));
    }
}
