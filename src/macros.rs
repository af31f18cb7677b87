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

#[cfg(doc)]
use crate::ValueSend;

#[cfg(test)]
macro_rules! hash_map {
    () => {std::collections::HashMap::new()};
    ( $($key:expr => $value:expr),* $(,)? ) => {
        {
            let mut m = std::collections::HashMap::new();
            $(
                m.insert($key, $value);
            )*
            m
        }
    };
}

#[cfg(test)]
pub(crate) use hash_map;

/// Short notation for creating a [`ValueSend`].
///
/// Lists and maps nest. Anything else must be a single token tree implementing
/// [`Into<ValueSend>`]; wrap longer expressions (e.g., negative numbers) in parentheses.
///
/// ```
/// use neo4j_client::{value, ValueSend};
///
/// assert_eq!(ValueSend::Null, value!(null));
/// assert_eq!(ValueSend::Integer(-1), value!((-1)));
/// assert_eq!(
///     ValueSend::List(vec![ValueSend::Integer(1), ValueSend::Float(2.), ValueSend::Null]),
///     value!([1, 2., null])
/// );
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::ValueSend::Null
    };
    ([ $($element:tt),* $(,)? ]) => {
        $crate::ValueSend::List(vec![$($crate::value!($element)),*])
    };
    ({ $($map:tt)* }) => {
        $crate::ValueSend::Map($crate::value_map!({ $($map)* }))
    };
    ($other:expr) => {
        $crate::ValueSend::from($other)
    };
}

/// Short notation for creating a [`HashMap<String, ValueSend>`](std::collections::HashMap),
/// e.g., query parameters.
///
/// ```
/// use neo4j_client::{value_map, ValueSend};
///
/// let params = value_map!({"name": "Alice", "tags": ["a", "b"], "age": null});
/// assert_eq!(params["age"], ValueSend::Null);
/// assert!(value_map!().is_empty());
/// ```
#[macro_export]
macro_rules! value_map {
    ($(,)?) => {
        ::std::collections::HashMap::<::std::string::String, $crate::ValueSend>::new()
    };
    ({ $($key:literal : $value:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map =
                ::std::collections::HashMap::<::std::string::String, $crate::ValueSend>::new();
            $(
                map.insert(::std::string::String::from($key), $crate::value!($value));
            )*
            map
        }
    };
}
