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

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rustls::ClientConfig;

use super::socket::Socket;
use crate::address::Address;
use crate::{Neo4jError, Result};

const BOLT_MAGIC_PREAMBLE: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];
const BOLT_VERSION_OFFER: [u8; 16] = [
    0, 0, 0, 5, // BOLT 5.0
    0, 0, 4, 4, // BOLT 4.4
    0, 0, 0, 0, // -
    0, 0, 0, 0, // -
];

/// Connect to `address`, wrap the stream in TLS if configured, and negotiate the protocol
/// version.
pub(super) fn open(
    address: &Address,
    connect_timeout: Option<Duration>,
    socket_timeout: Option<Duration>,
    tls_config: Option<&Arc<ClientConfig>>,
) -> Result<(Socket, (u8, u8))> {
    debug!("C: <OPEN> {address}");
    let stream = Neo4jError::wrap_connect(match connect_timeout {
        None => TcpStream::connect(address),
        Some(timeout) => each_addr(address, |addr| TcpStream::connect_timeout(addr, timeout)),
    })?;
    Neo4jError::wrap_connect(stream.set_read_timeout(socket_timeout))?;
    Neo4jError::wrap_connect(stream.set_write_timeout(socket_timeout))?;
    Neo4jError::wrap_connect(stream.set_nodelay(true))?;
    let mut socket = Socket::new(stream, address.host(), tls_config)?;
    match handshake(&mut socket) {
        Ok(version) => Ok((socket, version)),
        Err(err) => {
            info!("closing socket because handshake failed: {err}");
            socket.shutdown();
            Err(err)
        }
    }
}

pub(super) fn handshake<S: Read + Write>(stream: &mut S) -> Result<(u8, u8)> {
    debug!("C: <HANDSHAKE> {:02X?}", BOLT_MAGIC_PREAMBLE);
    Neo4jError::wrap_write(stream.write_all(&BOLT_MAGIC_PREAMBLE))?;
    debug!("C: <BOLT> {:02X?}", BOLT_VERSION_OFFER);
    Neo4jError::wrap_write(stream.write_all(&BOLT_VERSION_OFFER))?;
    Neo4jError::wrap_write(stream.flush())?;

    let mut negotiated_version = [0u8; 4];
    Neo4jError::wrap_read(stream.read_exact(&mut negotiated_version))?;
    debug!("S: <BOLT> {:02X?}", negotiated_version);
    decode_version_offer(&negotiated_version)
}

fn decode_version_offer(offer: &[u8; 4]) -> Result<(u8, u8)> {
    match offer {
        [0, 0, 0, 0] => Err(Neo4jError::disconnect("server rejected all versions")),
        [_, _, 0, 5] => Ok((5, 0)),
        [_, _, 4, 4] => Ok((4, 4)),
        [72, 84, 84, 80] => {
            // "HTTP"
            Err(Neo4jError::invalid_config(format!(
                "unexpected server handshake response {:?} (looks like HTTP, \
                use an http:// or https:// URI to talk to this port)",
                offer
            )))
        }
        _ => Err(Neo4jError::protocol_error(format!(
            "unexpected server handshake response {:?}",
            offer
        ))),
    }
}

fn each_addr<F, T>(address: &Address, mut f: F) -> io::Result<T>
where
    F: FnMut(&SocketAddr) -> io::Result<T>,
{
    let mut last_err = None;
    for addr in address.to_socket_addrs()? {
        match f(&addr) {
            Ok(res) => return Ok(res),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )
    }))
}
