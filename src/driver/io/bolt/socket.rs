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

use std::io::{IoSlice, IoSliceMut, Read, Result as IoResult, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection, ServerName, StreamOwned};

use crate::{Neo4jError, Result};

#[derive(Debug)]
pub(crate) enum Socket {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Socket {
    pub(super) fn new(
        stream: TcpStream,
        host_name: &str,
        tls_config: Option<&Arc<ClientConfig>>,
    ) -> Result<Self> {
        Ok(match tls_config {
            None => Self::Plain(stream),
            Some(tls_config) => {
                let server_name = ServerName::try_from(host_name).map_err(|e| {
                    Neo4jError::invalid_config(format!("tls refused hostname {host_name}: {e}"))
                })?;
                let connection = ClientConnection::new(Arc::clone(tls_config), server_name)
                    .map_err(|e| {
                        Neo4jError::invalid_config(format!("failed to initialize tls stream: {e}"))
                    })?;
                Self::Tls(Box::new(StreamOwned::new(connection, stream)))
            }
        })
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Socket::Plain(stream) => stream,
            Socket::Tls(stream) => stream.get_ref(),
        }
    }

    pub(super) fn shutdown(&self) {
        let _ = self.tcp().shutdown(Shutdown::Both);
    }
}

impl Read for Socket {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self {
            Socket::Plain(io) => io.read(buf),
            Socket::Tls(io) => io.read(buf),
        }
    }

    #[inline]
    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> IoResult<usize> {
        match self {
            Socket::Plain(io) => io.read_vectored(bufs),
            Socket::Tls(io) => io.read_vectored(bufs),
        }
    }
}

impl Write for Socket {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self {
            Socket::Plain(io) => io.write(buf),
            Socket::Tls(io) => io.write(buf),
        }
    }

    #[inline]
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> IoResult<usize> {
        match self {
            Socket::Plain(io) => io.write_vectored(bufs),
            Socket::Tls(io) => io.write_vectored(bufs),
        }
    }

    #[inline]
    fn flush(&mut self) -> IoResult<()> {
        match self {
            Socket::Plain(io) => io.flush(),
            Socket::Tls(io) => io.flush(),
        }
    }
}
