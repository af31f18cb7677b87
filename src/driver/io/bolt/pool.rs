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

use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use rustls::ClientConfig;

use super::handshake;
use super::protocol::Bolt;
use super::socket::Socket;
use super::BoltChannel;
use crate::address::Address;
use crate::driver::config::auth::Authenticate;
use crate::driver::io::{Channel, Connection, ConnectionPool, ConnectionProtocol};
use crate::driver::session::SessionConfig;
use crate::uri::Uri;
use crate::{Neo4jError, Result, ValueSend};

type TcpBolt = Bolt<Socket>;

#[derive(Debug, Clone)]
pub(crate) struct PoolConfig {
    pub(crate) max_connection_pool_size: usize,
    pub(crate) connection_timeout: Option<Duration>,
    pub(crate) connection_acquisition_timeout: Option<Duration>,
    pub(crate) tls_config: Option<Arc<ClientConfig>>,
    pub(crate) routing_context: Option<HashMap<String, ValueSend>>,
}

#[derive(Debug)]
struct PoolElement {
    bolt: TcpBolt,
    server_agent: String,
}

#[derive(Debug, Default)]
struct AddressPool {
    idle: VecDeque<PoolElement>,
    reservations: usize,
    borrowed: usize,
}

impl AddressPool {
    fn size(&self) -> usize {
        self.idle.len() + self.reservations + self.borrowed
    }
}

struct InnerPool {
    config: PoolConfig,
    synced: Mutex<HashMap<Address, AddressPool>>,
    made_room_condition: Condvar,
}

impl Debug for InnerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerPool")
            .field("max_connection_pool_size", &self.config.max_connection_pool_size)
            .finish_non_exhaustive()
    }
}

impl InnerPool {
    fn wait_for_room(
        &self,
        deadline: Option<Instant>,
        synced: &mut MutexGuard<HashMap<Address, AddressPool>>,
    ) -> Result<()> {
        match deadline {
            None => self.made_room_condition.wait(synced),
            Some(deadline) => {
                if self
                    .made_room_condition
                    .wait_until(synced, deadline)
                    .timed_out()
                {
                    return Err(Neo4jError::disconnect(
                        "timed out waiting for room in the connection pool",
                    ));
                }
            }
        }
        Ok(())
    }

    fn open_new(
        &self,
        address: &Address,
        uri: &Uri,
        auth: &Arc<dyn Authenticate>,
        socket_timeout: Option<Duration>,
        user_agent: &str,
    ) -> Result<PoolElement> {
        let (socket, version) = handshake::open(
            address,
            self.config.connection_timeout,
            socket_timeout,
            self.config.tls_config.as_ref(),
        )?;
        let mut bolt = Bolt::new(version, socket);
        let server_agent = bolt.hello(
            user_agent,
            &auth.authenticate_bolt(uri),
            self.config.routing_context.as_ref(),
        );
        match server_agent {
            Ok(server_agent) => Ok(PoolElement { bolt, server_agent }),
            Err(err) => {
                bolt.stream().shutdown();
                Err(err)
            }
        }
    }

    fn release(&self, address: &Address, mut element: PoolElement) {
        if !element.bolt.is_broken() {
            if let Err(err) = element.bolt.reset() {
                info!("ignoring failure during reset, dropping connection: {err}");
            }
        }
        let mut synced = self.synced.lock();
        let pool = synced.entry(address.clone()).or_default();
        pool.borrowed -= 1;
        if element.bolt.is_broken() {
            element.bolt.stream().shutdown();
        } else {
            pool.idle.push_back(element);
        }
        drop(synced);
        self.made_room_condition.notify_all();
    }

    fn cancel_reservation(&self, address: &Address) {
        let mut synced = self.synced.lock();
        if let Some(pool) = synced.get_mut(address) {
            pool.reservations -= 1;
        }
        drop(synced);
        self.made_room_condition.notify_all();
    }
}

impl Drop for InnerPool {
    fn drop(&mut self) {
        for (address, pool) in self.synced.get_mut().iter_mut() {
            for mut element in pool.idle.drain(..) {
                debug!("closing idle connection to {address}");
                element.bolt.goodbye();
                element.bolt.stream().shutdown();
            }
        }
    }
}

/// Keeps idle Bolt connections per server address for reuse.
///
/// Connections are authenticated when opened and reused as they are, so a pool must only ever
/// be used with one set of credentials. The [`Driver`](crate::Driver) makes sure of that.
#[derive(Debug, Clone)]
pub struct BoltConnectionPool {
    inner: Arc<InnerPool>,
}

impl BoltConnectionPool {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(InnerPool {
                config,
                synced: Mutex::new(HashMap::new()),
                made_room_condition: Condvar::new(),
            }),
        }
    }

    /// Borrow an idle connection or reserve room for a new one.
    fn reserve(&self, address: &Address) -> Result<Option<PoolElement>> {
        let deadline = self
            .inner
            .config
            .connection_acquisition_timeout
            .map(|timeout| Instant::now() + timeout);
        let mut synced = self.inner.synced.lock();
        loop {
            let pool = synced.entry(address.clone()).or_default();
            if let Some(element) = pool.idle.pop_front() {
                pool.borrowed += 1;
                return Ok(Some(element));
            }
            if pool.size() < self.inner.config.max_connection_pool_size {
                pool.reservations += 1;
                return Ok(None);
            }
            self.inner.wait_for_room(deadline, &mut synced)?;
        }
    }

    #[cfg(test)]
    fn idle_count(&self, address: &Address) -> usize {
        self.inner
            .synced
            .lock()
            .get(address)
            .map(|pool| pool.idle.len())
            .unwrap_or_default()
    }
}

impl ConnectionPool for BoltConnectionPool {
    fn acquire(
        &self,
        uri: &Uri,
        auth: &Arc<dyn Authenticate>,
        socket_timeout: Option<Duration>,
        user_agent: &str,
        config: &SessionConfig,
    ) -> Result<Connection> {
        let address = uri.address();
        let element = match self.reserve(&address)? {
            Some(element) => element,
            None => {
                let element =
                    self.inner
                        .open_new(&address, uri, auth, socket_timeout, user_agent);
                match element {
                    Ok(element) => {
                        let mut synced = self.inner.synced.lock();
                        let pool = synced.entry(address.clone()).or_default();
                        pool.reservations -= 1;
                        pool.borrowed += 1;
                        element
                    }
                    Err(err) => {
                        self.inner.cancel_reservation(&address);
                        return Err(err);
                    }
                }
            }
        };
        let (major, minor) = element.bolt.version();
        let server_agent = element.server_agent.clone();
        let server_version = server_agent
            .split_once('/')
            .map(|(_, version)| String::from(version))
            .unwrap_or_default();
        debug!("acquired Bolt {major}.{minor} connection to {address} ({server_agent})");
        Ok(Connection::new(
            server_agent,
            server_version,
            ConnectionProtocol::Bolt { major, minor },
            config,
            Channel::Bolt(BoltChannel::new(PooledBolt {
                element: Some(element),
                address,
                pool: Arc::clone(&self.inner),
            })),
        ))
    }
}

/// A borrowed connection, handed back to its pool when dropped.
pub(crate) struct PooledBolt {
    element: Option<PoolElement>,
    address: Address,
    pool: Arc<InnerPool>,
}

impl Debug for PooledBolt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBolt")
            .field("address", &self.address)
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledBolt {
    type Target = TcpBolt;

    fn deref(&self) -> &Self::Target {
        match &self.element {
            Some(element) => &element.bolt,
            None => unreachable!("connection is only taken when dropped"),
        }
    }
}

impl DerefMut for PooledBolt {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.element {
            Some(element) => &mut element.bolt,
            None => unreachable!("connection is only taken when dropped"),
        }
    }
}

impl Drop for PooledBolt {
    fn drop(&mut self) {
        if let Some(element) = self.element.take() {
            self.pool.release(&self.address, element);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use rstest::*;

    use super::super::chunk::{Chunker, Dechunker};
    use super::super::message::test_util::success;
    use super::*;
    use crate::driver::config::auth::AuthToken;
    use crate::value_map;

    const HELLO: u8 = 0x01;
    const RESET: u8 = 0x0F;

    /// Accept one connection and answer the expected messages in order.
    fn fake_server(script: Vec<(u8, Vec<u8>)>) -> (Uri, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut handshake = [0; 20];
            stream.read_exact(&mut handshake).unwrap();
            assert_eq!(handshake[..4], [0x60, 0x60, 0xB0, 0x17]);
            stream.write_all(&[0, 0, 0, 5]).unwrap();
            for (tag, reply) in script {
                let message = Dechunker::new(&mut stream).read_message().unwrap();
                assert_eq!(message[1], tag);
                for chunk in Chunker::new(&reply) {
                    stream.write_all(&chunk).unwrap();
                }
            }
        });
        let uri = Uri::parse(&format!("bolt://127.0.0.1:{port}")).unwrap();
        (uri, handle)
    }

    fn pool(max_size: usize) -> BoltConnectionPool {
        BoltConnectionPool::new(PoolConfig {
            max_connection_pool_size: max_size,
            connection_timeout: Some(Duration::from_secs(2)),
            connection_acquisition_timeout: Some(Duration::from_millis(100)),
            tls_config: None,
            routing_context: None,
        })
    }

    fn acquire(pool: &BoltConnectionPool, uri: &Uri) -> Result<Connection> {
        let auth: Arc<dyn Authenticate> = Arc::new(AuthToken::new_basic_auth("neo4j", "pass"));
        pool.acquire(
            uri,
            &auth,
            Some(Duration::from_secs(2)),
            "test/1.0",
            &SessionConfig::new(),
        )
    }

    #[rstest]
    fn test_connection_is_reused() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (uri, server) = fake_server(vec![
            (HELLO, success(value_map!({"server": "Neo4j/5.3.0"}))),
            (RESET, success(value_map!())),
            (RESET, success(value_map!())),
        ]);
        let pool = pool(10);

        let connection = acquire(&pool, &uri).unwrap();
        assert_eq!(connection.server_agent(), "Neo4j/5.3.0");
        assert_eq!(connection.server_version(), "5.3.0");
        assert_eq!(
            connection.protocol(),
            ConnectionProtocol::Bolt { major: 5, minor: 0 }
        );
        drop(connection);
        assert_eq!(pool.idle_count(&uri.address()), 1);

        // the fake server only accepts one connection
        let connection = acquire(&pool, &uri).unwrap();
        assert_eq!(pool.idle_count(&uri.address()), 0);
        drop(connection);
        server.join().unwrap();
    }

    #[rstest]
    fn test_full_pool_times_out() {
        let (uri, server) = fake_server(vec![
            (HELLO, success(value_map!({"server": "Neo4j/5.3.0"}))),
            (RESET, success(value_map!())),
        ]);
        let pool = pool(1);

        let connection = acquire(&pool, &uri).unwrap();
        let err = acquire(&pool, &uri).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
        drop(connection);
        server.join().unwrap();
    }

    #[rstest]
    fn test_failed_connect_frees_reservation() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let uri = Uri::parse(&format!("bolt://127.0.0.1:{port}")).unwrap();
        let pool = pool(1);

        assert!(acquire(&pool, &uri).is_err());
        // reservation was given back, so this is a connect error again, not a timeout
        let err = acquire(&pool, &uri).unwrap_err();
        assert!(err.to_string().contains("failed to open connection"));
    }
}
