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
use std::fmt::{Debug, Formatter};
use std::time::Duration;

use log::{debug, log_enabled, Level};

use super::packstream::{
    PackStreamDeserializerImpl, PackStreamSerialize, PackStreamSerializeError,
    PackStreamSerializer, PackStreamSerializerImpl,
};
use crate::driver::io::TransactionParameters;
use crate::driver::session::config::AccessMode;
use crate::error::ServerError;
use crate::value::{Structure, ValueReceive};
use crate::{Neo4jError, Result, ValueSend};

const TAG_HELLO: u8 = 0x01;
const TAG_GOODBYE: u8 = 0x02;
const TAG_RESET: u8 = 0x0F;
const TAG_RUN: u8 = 0x10;
const TAG_BEGIN: u8 = 0x11;
const TAG_COMMIT: u8 = 0x12;
const TAG_ROLLBACK: u8 = 0x13;
const TAG_PULL: u8 = 0x3F;

const TAG_SUCCESS: u8 = 0x70;
const TAG_RECORD: u8 = 0x71;
const TAG_IGNORED: u8 = 0x7E;
const TAG_FAILURE: u8 = 0x7F;

pub(super) type Metadata = HashMap<String, ValueReceive>;

pub(super) enum Request<'a> {
    Hello {
        user_agent: &'a str,
        auth: &'a HashMap<String, ValueSend>,
        routing_context: Option<&'a HashMap<String, ValueSend>>,
    },
    Goodbye,
    Reset,
    Run {
        query: &'a str,
        parameters: &'a HashMap<String, ValueSend>,
        extra: HashMap<String, ValueSend>,
    },
    Begin {
        extra: HashMap<String, ValueSend>,
    },
    Pull,
    Commit,
    Rollback,
}

impl<'a> Request<'a> {
    fn tag(&self) -> u8 {
        match self {
            Request::Hello { .. } => TAG_HELLO,
            Request::Goodbye => TAG_GOODBYE,
            Request::Reset => TAG_RESET,
            Request::Run { .. } => TAG_RUN,
            Request::Begin { .. } => TAG_BEGIN,
            Request::Pull => TAG_PULL,
            Request::Commit => TAG_COMMIT,
            Request::Rollback => TAG_ROLLBACK,
        }
    }

    pub(super) fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "HELLO",
            Request::Goodbye => "GOODBYE",
            Request::Reset => "RESET",
            Request::Run { .. } => "RUN",
            Request::Begin { .. } => "BEGIN",
            Request::Pull => "PULL",
            Request::Commit => "COMMIT",
            Request::Rollback => "ROLLBACK",
        }
    }

    pub(super) fn encode(&self) -> Result<Vec<u8>> {
        if log_enabled!(Level::Debug) {
            debug!("C: {:?}", self);
        }
        let mut buffer = Vec::new();
        self.encode_into(&mut PackStreamSerializerImpl::new(&mut buffer))?;
        Ok(buffer)
    }

    fn encode_into<S: PackStreamSerializer<Error = PackStreamSerializeError>>(
        &self,
        serializer: &mut S,
    ) -> std::result::Result<(), PackStreamSerializeError> {
        match self {
            Request::Hello {
                user_agent,
                auth,
                routing_context,
            } => {
                let mut extra = (*auth).clone();
                extra.insert(String::from("user_agent"), (*user_agent).into());
                if let Some(routing_context) = routing_context {
                    extra.insert(
                        String::from("routing"),
                        ValueSend::Map((*routing_context).clone()),
                    );
                }
                serializer.write_struct_header(self.tag(), 1)?;
                extra.serialize(serializer)
            }
            Request::Run {
                query,
                parameters,
                extra,
            } => {
                serializer.write_struct_header(self.tag(), 3)?;
                serializer.write_string(query)?;
                parameters.serialize(serializer)?;
                extra.serialize(serializer)
            }
            Request::Begin { extra } => {
                serializer.write_struct_header(self.tag(), 1)?;
                extra.serialize(serializer)
            }
            Request::Pull => {
                serializer.write_struct_header(self.tag(), 1)?;
                serializer.write_dict_header(1)?;
                serializer.write_string("n")?;
                serializer.write_int(-1)
            }
            Request::Goodbye | Request::Reset | Request::Commit | Request::Rollback => {
                serializer.write_struct_header(self.tag(), 0)
            }
        }
    }
}

impl<'a> Debug for Request<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())?;
        match self {
            Request::Hello {
                user_agent,
                auth,
                routing_context,
            } => {
                let masked = auth
                    .iter()
                    .map(|(k, v)| match k.as_str() {
                        "credentials" => (k, String::from("\"**********\"")),
                        _ => (k, format!("{v:?}")),
                    })
                    .collect::<HashMap<_, _>>();
                write!(
                    f,
                    " {{user_agent: {user_agent:?}, auth: {masked:?}, routing: {routing_context:?}}}"
                )
            }
            Request::Run {
                query,
                parameters,
                extra,
            } => write!(f, " {query:?} {parameters:?} {extra:?}"),
            Request::Begin { extra } => write!(f, " {extra:?}"),
            Request::Pull => f.write_str(" {\"n\": -1}"),
            _ => Ok(()),
        }
    }
}

/// The `extra` dictionary of `BEGIN` and auto-commit `RUN`.
pub(super) fn transaction_extra(parameters: &TransactionParameters<'_>) -> HashMap<String, ValueSend> {
    let mut extra = HashMap::new();
    extra.insert(String::from("db"), parameters.database.into());
    if parameters.access_mode == AccessMode::Read {
        extra.insert(String::from("mode"), "r".into());
    }
    if !parameters.bookmarks.is_empty() {
        extra.insert(
            String::from("bookmarks"),
            ValueSend::List(parameters.bookmarks.iter().map(|b| b.as_str().into()).collect()),
        );
    }
    if let Some(timeout) = parameters.config.timeout() {
        extra.insert(String::from("tx_timeout"), timeout_millis(timeout).into());
    }
    let metadata = parameters.config.metadata();
    if !metadata.is_empty() {
        extra.insert(String::from("tx_meta"), ValueSend::Map(metadata.clone()));
    }
    extra
}

/// Sub-millisecond timeouts are rounded up: the server reads 0 as "no timeout".
fn timeout_millis(timeout: Duration) -> i64 {
    let millis = timeout.as_millis();
    let millis = match (millis, timeout.subsec_nanos() % 1_000_000) {
        (0, 0) => 0,
        (millis, 0) => millis,
        (millis, _) => millis + 1,
    };
    i64::try_from(millis).unwrap_or(i64::MAX)
}

#[derive(Debug, PartialEq)]
pub(super) enum Response {
    Success(Metadata),
    Record(Vec<ValueReceive>),
    Ignored,
    Failure(ServerError),
}

impl Response {
    pub(super) fn decode(message: &[u8]) -> Result<Self> {
        let mut reader = message;
        let value = PackStreamDeserializerImpl::new(&mut reader).load()?;
        let ValueReceive::Structure(Structure { tag, fields }) = value else {
            return Err(Neo4jError::protocol_error(format!(
                "expected response structure, found {value:?}"
            )));
        };
        let mut fields = fields.into_iter();
        let response = match (tag, fields.next(), fields.next()) {
            (TAG_SUCCESS, Some(ValueReceive::Map(metadata)), None) => Response::Success(metadata),
            (TAG_RECORD, Some(ValueReceive::List(values)), None) => Response::Record(values),
            (TAG_IGNORED, None, None) => Response::Ignored,
            (TAG_FAILURE, Some(ValueReceive::Map(mut metadata)), None) => {
                let mut take_string = |key: &str| match metadata.remove(key) {
                    Some(ValueReceive::String(value)) => value,
                    _ => String::new(),
                };
                let code = take_string("code");
                let message = take_string("message");
                Response::Failure(ServerError::new(code, message))
            }
            (tag, ..) => {
                return Err(Neo4jError::protocol_error(format!(
                    "unexpected response message with tag {tag:02X}"
                )))
            }
        };
        if log_enabled!(Level::Debug) {
            match &response {
                Response::Success(metadata) => debug!("S: SUCCESS {metadata:?}"),
                Response::Record(values) => debug!("S: RECORD {values:?}"),
                Response::Ignored => debug!("S: IGNORED"),
                Response::Failure(error) => debug!("S: FAILURE {error}"),
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
pub(super) mod test_util {
    use super::*;

    /// Serialize a server response the way the server would.
    pub(in super::super) fn encode_response(tag: u8, fields: &[ValueSend]) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut buffer);
        serializer
            .write_struct_header(tag, fields.len() as u8)
            .unwrap();
        for field in fields {
            field.serialize(&mut serializer).unwrap();
        }
        buffer
    }

    pub(in super::super) fn success(metadata: HashMap<String, ValueSend>) -> Vec<u8> {
        encode_response(TAG_SUCCESS, &[ValueSend::Map(metadata)])
    }

    pub(in super::super) fn record(values: Vec<ValueSend>) -> Vec<u8> {
        encode_response(TAG_RECORD, &[ValueSend::List(values)])
    }

    pub(in super::super) fn ignored() -> Vec<u8> {
        encode_response(TAG_IGNORED, &[])
    }

    pub(in super::super) fn failure(code: &str, message: &str) -> Vec<u8> {
        encode_response(
            TAG_FAILURE,
            &[ValueSend::Map(HashMap::from([
                (String::from("code"), code.into()),
                (String::from("message"), message.into()),
            ]))],
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::test_util::*;
    use super::*;
    use crate::driver::transaction::TransactionConfig;
    use crate::value_map;

    #[rstest]
    fn test_encode_pull() {
        let bytes = Request::Pull.encode().unwrap();
        assert_eq!(bytes, [0xB1, 0x3F, 0xA1, 0x81, 0x6E, 0xFF]);
    }

    #[rstest]
    #[case(Request::Reset, [0xB0, 0x0F])]
    #[case(Request::Goodbye, [0xB0, 0x02])]
    #[case(Request::Commit, [0xB0, 0x12])]
    #[case(Request::Rollback, [0xB0, 0x13])]
    fn test_encode_empty_messages(#[case] request: Request, #[case] bytes: [u8; 2]) {
        assert_eq!(request.encode().unwrap(), bytes);
    }

    #[rstest]
    fn test_hello_masks_credentials() {
        let auth = value_map!({"scheme": "basic", "principal": "neo4j", "credentials": "pass"});
        let request = Request::Hello {
            user_agent: "test/1.0",
            auth: &auth,
            routing_context: None,
        };
        let logged = format!("{request:?}");
        assert!(logged.starts_with("HELLO"));
        assert!(!logged.contains("pass\""));
        assert!(logged.contains("**********"));
    }

    #[rstest]
    #[case(None, 0xA2)]
    #[case(Some(value_map!({"region": "eu"})), 0xA3)]
    fn test_encode_hello(
        #[case] routing_context: Option<HashMap<String, ValueSend>>,
        #[case] map_header: u8,
    ) {
        let auth = value_map!({"scheme": "none"});
        let bytes = Request::Hello {
            user_agent: "test/1.0",
            auth: &auth,
            routing_context: routing_context.as_ref(),
        }
        .encode()
        .unwrap();
        assert_eq!(bytes[..3], [0xB1, 0x01, map_header]);
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"user_agent"));
        assert!(contains(b"test/1.0"));
        assert!(contains(b"scheme"));
        assert_eq!(contains(b"routing"), routing_context.is_some());
        // the caller's auth map is left untouched
        assert_eq!(auth.len(), 1);
    }

    #[rstest]
    fn test_transaction_extra() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_micros(1500))
            .with_metadata(value_map!({"app": "test"}));
        let bookmarks = vec![String::from("bm:1")];
        let extra = transaction_extra(&TransactionParameters {
            database: "movies",
            access_mode: AccessMode::Read,
            bookmarks: &bookmarks,
            config: &config,
        });
        assert_eq!(extra["db"], ValueSend::from("movies"));
        assert_eq!(extra["mode"], ValueSend::from("r"));
        assert_eq!(extra["bookmarks"], ValueSend::List(vec!["bm:1".into()]));
        assert_eq!(extra["tx_timeout"], ValueSend::Integer(2));
        assert_eq!(extra["tx_meta"], ValueSend::Map(value_map!({"app": "test"})));
    }

    #[rstest]
    fn test_transaction_extra_write_defaults() {
        let config = TransactionConfig::new();
        let extra = transaction_extra(&TransactionParameters {
            database: "neo4j",
            access_mode: AccessMode::Write,
            bookmarks: &[],
            config: &config,
        });
        assert_eq!(extra.len(), 1);
    }

    #[rstest]
    fn test_decode_responses() {
        assert_eq!(
            Response::decode(&success(value_map!({"server": "Neo4j/5.3.0"}))).unwrap(),
            Response::Success(HashMap::from([(
                String::from("server"),
                ValueReceive::String("Neo4j/5.3.0".into())
            )]))
        );
        assert_eq!(
            Response::decode(&record(vec![1.into()])).unwrap(),
            Response::Record(vec![ValueReceive::Integer(1)])
        );
        assert_eq!(Response::decode(&ignored()).unwrap(), Response::Ignored);
        let Response::Failure(error) =
            Response::decode(&failure("Neo.ClientError.Statement.SyntaxError", "oops")).unwrap()
        else {
            panic!("expected failure");
        };
        assert_eq!(error.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(error.message(), "oops");
    }

    #[rstest]
    fn test_decode_unknown_message() {
        let err = Response::decode(&encode_response(0x42, &[])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }
}
