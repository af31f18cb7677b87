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

pub(crate) mod auth;

use std::collections::HashMap;
use std::path::Path;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use mockall_double::double;
use rustls::ClientConfig;
use thiserror::Error;

use super::io::http::HttpClient;
use crate::uri::{Scheme, SchemeEncryption, Uri};
use crate::{Neo4jError, Result, ValueSend};

const DEFAULT_USER_AGENT: &str = env!("NEO4J_CLIENT_DEFAULT_USER_AGENT");
pub(crate) const DEFAULT_MAX_CONNECTION_POOL_SIZE: usize = 100;
pub(crate) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_CONNECTION_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every driver a [`Client`](crate::Client) creates.
///
/// Connection related settings only apply to Bolt: the HTTP transport is configured through the
/// [`HttpClient`] (see [`DriverConfig::with_http_client()`]).
#[derive(Debug)]
pub struct DriverConfig {
    pub(crate) user_agent: String,
    pub(crate) max_connection_pool_size: usize,
    pub(crate) connection_timeout: Option<Duration>,
    pub(crate) connection_acquisition_timeout: Option<Duration>,
    pub(crate) http_client: Option<Arc<dyn HttpClient>>,
    pub(crate) tls_config: Option<Arc<ClientConfig>>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            user_agent: String::from(DEFAULT_USER_AGENT),
            max_connection_pool_size: DEFAULT_MAX_CONNECTION_POOL_SIZE,
            connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT),
            connection_acquisition_timeout: Some(DEFAULT_CONNECTION_ACQUISITION_TIMEOUT),
            http_client: None,
            tls_config: None,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Maximum number of Bolt connections per server address.
    pub fn with_max_connection_pool_size(mut self, max_connection_pool_size: usize) -> Self {
        self.max_connection_pool_size = max_connection_pool_size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn without_connection_timeout(mut self) -> Self {
        self.connection_timeout = None;
        self
    }

    /// How long to wait for a free slot when the pool is full.
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.connection_acquisition_timeout = Some(timeout);
        self
    }

    pub fn without_connection_acquisition_timeout(mut self) -> Self {
        self.connection_acquisition_timeout = None;
        self
    }

    /// Send HTTP requests through `client` instead of a
    /// [`ReqwestClient`](crate::driver::io::http::ReqwestClient) built per driver.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn without_http_client(mut self) -> Self {
        self.http_client = None;
        self
    }

    pub fn with_encryption_trust_default_cas(mut self) -> StdResult<Self, TlsConfigError> {
        self.tls_config = Some(Arc::new(match tls_helper::secure_tls_config() {
            Ok(config) => config,
            Err(message) => {
                return Err(TlsConfigError {
                    message,
                    config: self,
                })
            }
        }));
        Ok(self)
    }

    pub fn with_encryption_trust_custom_cas<P: AsRef<Path>>(
        self,
        paths: &[P],
    ) -> StdResult<Self, TlsConfigError> {
        fn inner(
            mut config: DriverConfig,
            paths: &[&Path],
        ) -> StdResult<DriverConfig, TlsConfigError> {
            config.tls_config = Some(Arc::new(match tls_helper::custom_ca_tls_config(paths) {
                Ok(config) => config,
                Err(message) => return Err(TlsConfigError { message, config }),
            }));
            Ok(config)
        }
        let paths = paths.iter().map(|path| path.as_ref()).collect::<Vec<_>>();
        inner(self, &paths)
    }

    #[cfg(feature = "rustls_dangerous_configuration")]
    pub fn with_encryption_trust_any_certificate(mut self) -> Self {
        self.tls_config = Some(Arc::new(tls_helper::self_signed_tls_config()));
        self
    }

    pub fn with_encryption_custom_tls_config(mut self, tls_config: ClientConfig) -> Self {
        self.tls_config = Some(Arc::new(tls_config));
        self
    }

    /// Forget any configured TLS settings. Encrypted schemes fall back to the system's
    /// certificate authorities.
    pub fn with_default_encryption(mut self) -> Self {
        self.tls_config = None;
        self
    }

    /// The TLS configuration a Bolt connection for `scheme` uses.
    ///
    /// Unencrypted schemes ignore any configured TLS settings. `+s` schemes use the configured
    /// settings or the system's certificate authorities. `+ssc` schemes accept any certificate.
    pub(crate) fn bolt_tls_config(&self, scheme: Scheme) -> Result<Option<Arc<ClientConfig>>> {
        match scheme.encryption() {
            SchemeEncryption::None => {
                if self.tls_config.is_some() {
                    debug!("{scheme} is unencrypted, ignoring configured TLS settings");
                }
                Ok(None)
            }
            SchemeEncryption::Trusted => match &self.tls_config {
                Some(config) => Ok(Some(Arc::clone(config))),
                None => tls_helper::secure_tls_config()
                    .map(|config| Some(Arc::new(config)))
                    .map_err(Neo4jError::invalid_config),
            },
            SchemeEncryption::SelfSigned => self_signed_tls_config(scheme).map(Some),
        }
    }
}

#[cfg(feature = "rustls_dangerous_configuration")]
fn self_signed_tls_config(_scheme: Scheme) -> Result<Arc<ClientConfig>> {
    Ok(Arc::new(tls_helper::self_signed_tls_config()))
}

#[cfg(not(feature = "rustls_dangerous_configuration"))]
fn self_signed_tls_config(scheme: Scheme) -> Result<Arc<ClientConfig>> {
    Err(Neo4jError::invalid_config(format!(
        "`{scheme}` scheme requires crate feature `rustls_dangerous_configuration`"
    )))
}

/// Routing context announced in Bolt's `HELLO` by `neo4j` schemes: the address the user
/// connected to plus the URI's query parameters. `database` is a session default and left out.
pub(crate) fn routing_context(uri: &Uri) -> Result<HashMap<String, ValueSend>> {
    let mut context = HashMap::new();
    for (key, value) in uri.query_pairs() {
        match key {
            "address" => {
                return Err(Neo4jError::invalid_config(
                    "routing context cannot contain key 'address'",
                ))
            }
            "database" => {}
            _ => {
                context.insert(String::from(key), ValueSend::from(value));
            }
        }
    }
    context.insert(
        String::from("address"),
        ValueSend::from(uri.address().to_string()),
    );
    Ok(context)
}

#[derive(Debug, Error)]
#[non_exhaustive]
#[error("{message}")]
pub struct TlsConfigError {
    pub message: String,
    pub config: DriverConfig,
}

#[double]
use mockable::tls_helper;

mod mockable {
    #[cfg(test)]
    use mockall::automock;

    #[cfg_attr(test, automock)]
    pub(super) mod tls_helper {
        use rustls::ClientConfig;
        use rustls::{Certificate, RootCertStore};
        use std::fs::File;
        use std::io::{BufReader, Result as IoResult};
        use std::path::Path;
        use std::result::Result as StdResult;
        use std::sync::Arc;
        use std::sync::OnceLock;

        #[cfg(feature = "rustls_dangerous_configuration")]
        use super::NonVerifyingVerifier;

        static SYSTEM_CERTIFICATES: OnceLock<StdResult<Arc<RootCertStore>, String>> =
            OnceLock::new();

        pub fn secure_tls_config() -> StdResult<ClientConfig, String> {
            let root_store = SYSTEM_CERTIFICATES.get_or_init(|| {
                let mut root_store = RootCertStore::empty();
                let native_certs = rustls_native_certs::load_native_certs()
                    .map_err(|e| format!("failed to load system certificates: {e}"))?;
                let (_, _) = root_store.add_parsable_certificates(&native_certs);
                Ok(Arc::new(root_store))
            });
            let root_store = Arc::clone(root_store.as_ref().map_err(Clone::clone)?);
            Ok(ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(root_store)
                .with_no_client_auth())
        }

        #[allow(clippy::needless_lifetimes)] // explicit lifetimes required for automock
        pub fn custom_ca_tls_config<'a, 'b>(
            paths: &'a [&'b Path],
        ) -> StdResult<ClientConfig, String> {
            fn load_certificates_from_pem(path: &Path) -> IoResult<Vec<Certificate>> {
                let file = File::open(path)?;
                let mut reader = BufReader::new(file);
                let certs = rustls_pemfile::certs(&mut reader)?;

                Ok(certs.into_iter().map(Certificate).collect())
            }

            let mut root_store = RootCertStore::empty();
            for path in paths {
                let certs = load_certificates_from_pem(path)
                    .map_err(|e| format!("failed to load certificates from PEM file: {e}"))?;
                for cert in certs.into_iter() {
                    root_store.add(&cert).map_err(|e| {
                        format!("failed to add certificate(s) from {path:?} to root store: {e}")
                    })?;
                }
            }
            Ok(ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(root_store)
                .with_no_client_auth())
        }

        #[cfg(feature = "rustls_dangerous_configuration")]
        pub fn self_signed_tls_config() -> ClientConfig {
            let root_store = RootCertStore::empty();
            let mut config = ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(root_store)
                .with_no_client_auth();
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NonVerifyingVerifier {}));
            config
        }
    }

    #[cfg(feature = "rustls_dangerous_configuration")]
    mod dangerous {
        use std::result::Result as StdResult;
        use std::time::SystemTime;

        use rustls::client::{ServerCertVerified, ServerCertVerifier, ServerName};
        use rustls::Certificate;
        use rustls::Error as RustlsError;

        /// As the name suggests, this verifier happily accepts any certificate.
        /// This is not secure and should only be used for testing.
        pub(super) struct NonVerifyingVerifier {}

        impl ServerCertVerifier for NonVerifyingVerifier {
            fn verify_server_cert(
                &self,
                _end_entity: &Certificate,
                _intermediates: &[Certificate],
                _server_name: &ServerName,
                _scts: &mut dyn Iterator<Item = &[u8]>,
                _ocsp_response: &[u8],
                _now: SystemTime,
            ) -> StdResult<ServerCertVerified, RustlsError> {
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    #[cfg(feature = "rustls_dangerous_configuration")]
    use dangerous::NonVerifyingVerifier;
}
