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
use std::io::{BufReader, Read, Write};
use std::mem;

use log::{debug, info};

use super::chunk::{Chunker, Dechunker};
use super::message::{transaction_extra, Metadata, Request, Response};
use crate::driver::formatter::RawResult;
use crate::driver::io::{ChannelOps, ResultBatch, TransactionParameters};
use crate::driver::statement::Statement;
use crate::{Neo4jError, Result, ValueReceive, ValueSend};

/// Everything the server sent in reply to one request.
#[derive(Debug, Default)]
struct Reply {
    records: Vec<Vec<ValueReceive>>,
    metadata: Metadata,
}

/// One Bolt connection: pipelines requests and matches them with their responses.
pub(crate) struct Bolt<S: Read + Write> {
    stream: BufReader<S>,
    version: (u8, u8),
    outbox: Vec<u8>,
    pending: Vec<&'static str>,
    broken: bool,
}

impl<S: Read + Write> Bolt<S> {
    pub(crate) fn new(version: (u8, u8), stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            version,
            outbox: Vec::with_capacity(1024),
            pending: Vec::new(),
            broken: false,
        }
    }

    pub(crate) fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The connection experienced an IO or protocol error and must not be used again.
    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn stream(&self) -> &S {
        self.stream.get_ref()
    }

    fn enqueue(&mut self, request: Request<'_>) -> Result<()> {
        let message = request.encode()?;
        for chunk in Chunker::new(&message) {
            self.outbox.extend_from_slice(&chunk);
        }
        self.pending.push(request.name());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let outbox = mem::take(&mut self.outbox);
        let stream = self.stream.get_mut();
        let res = stream.write_all(&outbox).and_then(|_| stream.flush());
        self.outbox = outbox;
        self.outbox.clear();
        res.map_err(|err| {
            self.broken = true;
            Neo4jError::write_error(err)
        })
    }

    fn receive(&mut self) -> Result<Response> {
        let message = Dechunker::new(&mut self.stream)
            .read_message()
            .map_err(Neo4jError::read_err);
        let response = message.and_then(|message| Response::decode(&message));
        if response.is_err() {
            self.broken = true;
        }
        response
    }

    /// Send `requests` in one go and collect one [`Reply`] per request.
    ///
    /// On a server failure the remaining replies (all `IGNORED`) are drained and the
    /// connection is `RESET` before the failure is returned.
    fn roundtrip(&mut self, requests: Vec<Request<'_>>) -> Result<Vec<Reply>> {
        if self.broken {
            return Err(Neo4jError::disconnect("connection is broken"));
        }
        for request in requests {
            self.enqueue(request)?;
        }
        self.flush()?;
        let pending = mem::take(&mut self.pending);
        let mut replies = Vec::with_capacity(pending.len());
        let mut failure = None;
        for name in pending {
            let mut reply = Reply::default();
            loop {
                match self.receive()? {
                    Response::Record(values) => reply.records.push(values),
                    Response::Success(metadata) => {
                        reply.metadata = metadata;
                        break;
                    }
                    Response::Ignored => break,
                    Response::Failure(error) => {
                        failure.get_or_insert(error);
                        break;
                    }
                }
            }
            if failure.is_none() {
                replies.push(reply);
            } else {
                debug!("{name} not processed because of earlier failure");
            }
        }
        match failure {
            None => Ok(replies),
            Some(error) => {
                self.reset()?;
                Err(error.into())
            }
        }
    }

    pub(crate) fn hello(
        &mut self,
        user_agent: &str,
        auth: &HashMap<String, ValueSend>,
        routing_context: Option<&HashMap<String, ValueSend>>,
    ) -> Result<String> {
        let mut replies = self.roundtrip(vec![Request::Hello {
            user_agent,
            auth,
            routing_context,
        }])?;
        let metadata = mem::take(&mut replies[0].metadata);
        match metadata.get("server") {
            Some(ValueReceive::String(agent)) => Ok(agent.clone()),
            _ => Err(Neo4jError::protocol_error(
                "server did not send its agent in reply to HELLO",
            )),
        }
    }

    pub(crate) fn reset(&mut self) -> Result<()> {
        self.enqueue(Request::Reset)?;
        self.flush()?;
        self.pending.clear();
        loop {
            match self.receive()? {
                Response::Success(_) => return Ok(()),
                Response::Record(_) | Response::Ignored => continue,
                Response::Failure(error) => {
                    self.broken = true;
                    info!("RESET failed, dropping connection: {error}");
                    return Err(error.into());
                }
            }
        }
    }

    /// Say goodbye without waiting for an answer. Errors are irrelevant at this point.
    pub(crate) fn goodbye(&mut self) {
        if self.broken {
            return;
        }
        if self.enqueue(Request::Goodbye).is_ok() {
            let _ = self.flush();
        }
        self.pending.clear();
        self.broken = true;
    }
}

fn statement_requests<'a>(statements: &'a [Statement]) -> impl Iterator<Item = Request<'a>> {
    statements.iter().flat_map(|statement| {
        [
            Request::Run {
                query: statement.text(),
                parameters: statement.parameters(),
                extra: Default::default(),
            },
            Request::Pull,
        ]
    })
}

/// Turn the `RUN`/`PULL` reply pairs into results. `skip` replies are ignored at the start.
fn collect_results(replies: &mut [Reply], skip: usize, count: usize) -> Result<Vec<RawResult>> {
    replies[skip..skip + 2 * count]
        .chunks_exact_mut(2)
        .map(|pair| {
            let columns = match pair[0].metadata.remove("fields") {
                Some(ValueReceive::List(fields)) => fields
                    .into_iter()
                    .map(|field| match field {
                        ValueReceive::String(field) => Ok(field),
                        other => Err(Neo4jError::protocol_error(format!(
                            "expected field name, found {other:?}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Ok(RawResult::new(columns, mem::take(&mut pair[1].records)))
        })
        .collect()
}

fn bookmark(reply: &mut Reply) -> Option<String> {
    match reply.metadata.remove("bookmark") {
        Some(ValueReceive::String(bookmark)) => Some(bookmark),
        _ => None,
    }
}

fn expect_replies(replies: &[Reply], expected: usize) -> Result<()> {
    if replies.len() != expected {
        return Err(Neo4jError::protocol_error(format!(
            "expected {expected} replies, got {}",
            replies.len()
        )));
    }
    Ok(())
}

impl<S: Read + Write> ChannelOps for Bolt<S> {
    fn run_auto_commit(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        if let [statement] = statements {
            let mut replies = self
                .roundtrip(vec![
                    Request::Run {
                        query: statement.text(),
                        parameters: statement.parameters(),
                        extra: transaction_extra(parameters),
                    },
                    Request::Pull,
                ])
                .map_err(Neo4jError::during_commit)?;
            expect_replies(&replies, 2)?;
            let results = collect_results(&mut replies, 0, 1)?;
            return Ok(ResultBatch {
                results,
                bookmark: bookmark(&mut replies[1]),
            });
        }
        // several statements must succeed or fail together
        let mut requests = vec![Request::Begin {
            extra: transaction_extra(parameters),
        }];
        requests.extend(statement_requests(statements));
        requests.push(Request::Commit);
        let mut replies = self
            .roundtrip(requests)
            .map_err(Neo4jError::during_commit)?;
        expect_replies(&replies, 2 + 2 * statements.len())?;
        let results = collect_results(&mut replies, 1, statements.len())?;
        let commit = replies.len() - 1;
        Ok(ResultBatch {
            results,
            bookmark: bookmark(&mut replies[commit]),
        })
    }

    fn begin(
        &mut self,
        statements: &[Statement],
        parameters: &TransactionParameters<'_>,
    ) -> Result<ResultBatch> {
        let mut requests = vec![Request::Begin {
            extra: transaction_extra(parameters),
        }];
        requests.extend(statement_requests(statements));
        let mut replies = self.roundtrip(requests)?;
        expect_replies(&replies, 1 + 2 * statements.len())?;
        Ok(ResultBatch {
            results: collect_results(&mut replies, 1, statements.len())?,
            bookmark: None,
        })
    }

    fn run(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        if statements.is_empty() {
            return Ok(ResultBatch::default());
        }
        let mut replies = self.roundtrip(statement_requests(statements).collect())?;
        expect_replies(&replies, 2 * statements.len())?;
        Ok(ResultBatch {
            results: collect_results(&mut replies, 0, statements.len())?,
            bookmark: None,
        })
    }

    fn commit(&mut self, statements: &[Statement]) -> Result<ResultBatch> {
        let mut requests: Vec<_> = statement_requests(statements).collect();
        requests.push(Request::Commit);
        let mut replies = self
            .roundtrip(requests)
            .map_err(Neo4jError::during_commit)?;
        expect_replies(&replies, 1 + 2 * statements.len())?;
        let results = collect_results(&mut replies, 0, statements.len())?;
        let commit = replies.len() - 1;
        Ok(ResultBatch {
            results,
            bookmark: bookmark(&mut replies[commit]),
        })
    }

    fn rollback(&mut self) -> Result<()> {
        self.roundtrip(vec![Request::Rollback]).map(|_| ())
    }
}

impl<S: Read + Write> Debug for Bolt<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bolt")
            .field("version", &self.version)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(super) mod test_util {
    use std::io::{self, Cursor, Read};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::super::chunk::Chunker;

    /// Replays canned server messages and records what the client wrote.
    #[derive(Debug)]
    pub(in super::super) struct FakeStream {
        input: Cursor<Vec<u8>>,
        pub(in super::super) output: Arc<Mutex<Vec<u8>>>,
    }

    impl FakeStream {
        pub(in super::super) fn new(messages: &[Vec<u8>]) -> Self {
            let mut input = Vec::new();
            for message in messages {
                for chunk in Chunker::new(message) {
                    input.extend_from_slice(&chunk);
                }
            }
            Self {
                input: Cursor::new(input),
                output: Default::default(),
            }
        }
    }

    impl io::Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl io::Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::super::message::test_util::*;
    use super::test_util::FakeStream;
    use super::*;
    use crate::driver::session::config::AccessMode;
    use crate::driver::transaction::TransactionConfig;
    use crate::{value_map, ErrorKind};

    fn bolt(messages: &[Vec<u8>]) -> Bolt<FakeStream> {
        Bolt::new((5, 0), FakeStream::new(messages))
    }

    fn written_tags(bolt: &Bolt<FakeStream>) -> Vec<u8> {
        // every message here is small: 2 byte size, B?, tag, ..., 00 00
        let output = bolt.stream().output.lock().clone();
        let mut tags = Vec::new();
        let mut rest = output.as_slice();
        while rest.len() >= 2 {
            let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            if size > 0 {
                tags.push(rest[3]);
            }
            rest = &rest[2 + size..];
        }
        tags
    }

    fn run_success(fields: &[&str]) -> Vec<u8> {
        success(value_map!({"fields": (fields.to_vec())}))
    }

    #[rstest]
    fn test_hello() {
        let mut bolt = bolt(&[success(value_map!({"server": "Neo4j/5.3.0"}))]);
        let auth = value_map!({"scheme": "none"});
        let agent = bolt.hello("test/1.0", &auth, None).unwrap();
        assert_eq!(agent, "Neo4j/5.3.0");
        assert_eq!(written_tags(&bolt), [0x01]);
    }

    #[rstest]
    fn test_auto_commit_single_statement() {
        let mut bolt = bolt(&[
            run_success(&["x"]),
            record(vec![1.into()]),
            record(vec![2.into()]),
            success(value_map!({"bookmark": "bm:1"})),
        ]);
        let config = TransactionConfig::new();
        let batch = bolt
            .run_auto_commit(
                &[Statement::new("UNWIND [1, 2] AS x RETURN x")],
                &TransactionParameters {
                    database: "neo4j",
                    access_mode: AccessMode::Write,
                    bookmarks: &[],
                    config: &config,
                },
            )
            .unwrap();
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].columns(), ["x"]);
        assert_eq!(
            batch.results[0].rows(),
            [vec![ValueReceive::Integer(1)], vec![ValueReceive::Integer(2)]]
        );
        assert_eq!(batch.bookmark.as_deref(), Some("bm:1"));
        assert_eq!(written_tags(&bolt), [0x10, 0x3F]);
    }

    #[rstest]
    fn test_auto_commit_many_statements_in_order() {
        let mut bolt = bolt(&[
            success(value_map!()),
            run_success(&["a"]),
            record(vec!["first".into()]),
            success(value_map!()),
            run_success(&["b"]),
            record(vec!["second".into()]),
            success(value_map!()),
            success(value_map!({"bookmark": "bm:2"})),
        ]);
        let config = TransactionConfig::new();
        let batch = bolt
            .run_auto_commit(
                &[Statement::new("RETURN 'first' AS a"), Statement::new("RETURN 'second' AS b")],
                &TransactionParameters {
                    database: "neo4j",
                    access_mode: AccessMode::Write,
                    bookmarks: &[],
                    config: &config,
                },
            )
            .unwrap();
        assert_eq!(batch.results[0].columns(), ["a"]);
        assert_eq!(batch.results[1].columns(), ["b"]);
        assert_eq!(
            batch.results[1].rows(),
            [vec![ValueReceive::String("second".into())]]
        );
        assert_eq!(batch.bookmark.as_deref(), Some("bm:2"));
        assert_eq!(
            written_tags(&bolt),
            [0x11, 0x10, 0x3F, 0x10, 0x3F, 0x12]
        );
    }

    #[rstest]
    fn test_failure_drains_and_resets() {
        let mut bolt = bolt(&[
            success(value_map!()),
            failure("Neo.ClientError.Statement.SyntaxError", "Invalid input"),
            ignored(),
            success(value_map!()),
        ]);
        let config = TransactionConfig::new();
        let err = bolt
            .begin(
                &[Statement::new("RETURN")],
                &TransactionParameters {
                    database: "neo4j",
                    access_mode: AccessMode::Write,
                    bookmarks: &[],
                    config: &config,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(!bolt.is_broken());
        assert_eq!(written_tags(&bolt), [0x11, 0x10, 0x3F, 0x0F]);
    }

    #[rstest]
    fn test_commit_transport_failure_not_retryable() {
        // server hangs up without answering
        let mut bolt = bolt(&[]);
        let err = bolt.commit(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.is_retryable());
        assert!(bolt.is_broken());
        assert!(bolt.rollback().is_err());
    }

    #[rstest]
    fn test_goodbye_marks_closed() {
        let mut bolt = bolt(&[]);
        bolt.goodbye();
        assert!(bolt.is_broken());
        assert_eq!(written_tags(&bolt), [0x02]);
    }
}
