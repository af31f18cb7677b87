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

use std::io::{self, Read};
use std::ops::Deref;

use log::{log_enabled, trace, Level};
use usize_cast::IntoUsize;

const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Splits one serialized message into chunks: size header, payload, ..., empty end marker.
#[derive(Debug)]
pub(crate) struct Chunker<'a> {
    message: &'a [u8],
    pending_payload: Option<&'a [u8]>,
    ended: bool,
}

impl<'a> Chunker<'a> {
    pub(crate) fn new(message: &'a [u8]) -> Self {
        Self {
            message,
            pending_payload: None,
            ended: false,
        }
    }
}

impl<'a> Iterator for Chunker<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(payload) = self.pending_payload.take() {
            return Some(Chunk::Buffer(payload));
        }
        if self.ended {
            return None;
        }
        if self.message.is_empty() {
            self.ended = true;
            return Some(Chunk::Size([0, 0]));
        }
        let (payload, rest) = self
            .message
            .split_at(self.message.len().min(MAX_CHUNK_SIZE));
        self.message = rest;
        self.pending_payload = Some(payload);
        // payload is at most u16::MAX long
        Some(Chunk::Size((payload.len() as u16).to_be_bytes()))
    }
}

pub(crate) enum Chunk<'a> {
    Buffer(&'a [u8]),
    Size([u8; 2]),
}

impl<'a> Deref for Chunk<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Chunk::Buffer(buf) => buf,
            Chunk::Size(size) => size,
        }
    }
}

/// Reads chunks off the wire until a whole message has been received.
pub(crate) struct Dechunker<'r, R: Read> {
    reader: &'r mut R,
}

impl<'r, R: Read> Dechunker<'r, R> {
    pub(crate) fn new(reader: &'r mut R) -> Self {
        Self { reader }
    }

    /// Empty chunks before a message's first byte are keep-alive NOOPs and skipped.
    pub(crate) fn read_message(&mut self) -> io::Result<Vec<u8>> {
        let mut message = Vec::new();
        loop {
            let mut size_buf = [0; 2];
            self.reader.read_exact(&mut size_buf)?;
            let size = u16::from_be_bytes(size_buf).into_usize();
            if size == 0 {
                if message.is_empty() {
                    trace!("S: <NOOP>");
                    continue;
                }
                break;
            }
            let start = message.len();
            message.resize(start + size, 0);
            self.reader.read_exact(&mut message[start..])?;
        }
        if log_enabled!(Level::Trace) {
            trace!("S: <RAW> {:02X?}", message);
        }
        Ok(message)
    }
}
