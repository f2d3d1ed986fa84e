// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Opens mutually authenticated TLS connections to Cloud SQL instances.
//!
//! The connection trusts only the instance server CA certificate, presents
//! the ephemeral client certificate, requires TLS 1.3, and verifies the
//! server identity with a [ServerIdentityCheck] instead of the hostname.
//! Cloud SQL instances accept these connections on port
//! [SERVER_PROXY_PORT], the database wire protocol runs inside the TLS
//! stream.
//!
//! # Example
//! ```no_run
//! # use google_cloud_sql_connector::instance::InstanceConnectionInfo;
//! # use google_cloud_sql_connector::socket::SocketBuilder;
//! # use google_cloud_sql_connector::ssl_cert::SslCert;
//! # use tokio_util::sync::CancellationToken;
//! # async fn sample(server_ca: SslCert, client: SslCert, key: String) -> google_cloud_sql_connector::Result<()> {
//! let info: InstanceConnectionInfo = "my-project:us-central1:my-instance".parse()?;
//! let socket = SocketBuilder::new(info, &server_ca, &client, key)
//!     .connect("10.0.0.1", &CancellationToken::new())
//!     .await?;
//! println!("connected to {:?}", socket.peer_addr());
//! # Ok(()) }
//! ```

mod verifier;

pub use verifier::{CommonNameCheck, DnsNameCheck, IdentityError, ServerIdentityCheck};

use crate::Result;
use crate::error::Error;
use crate::instance::InstanceConnectionInfo;
use crate::ssl_cert::SslCert;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;
use verifier::InstanceCertVerifier;

/// The port used by the Cloud SQL server proxy.
///
/// This is not the database port, the server proxy terminates the TLS
/// connection and forwards the traffic to the database.
pub const SERVER_PROXY_PORT: u16 = 3307;

/// Configures and opens TLS connections to an instance.
#[derive(Clone)]
pub struct SocketBuilder {
    info: InstanceConnectionInfo,
    server_ca_cert: String,
    client_cert: String,
    private_key: String,
    identity: Option<Arc<dyn ServerIdentityCheck>>,
}

impl std::fmt::Debug for SocketBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketBuilder")
            .field("info", &self.info)
            .field("server_ca_cert", &self.server_ca_cert)
            .field("client_cert", &self.client_cert)
            .field("private_key", &"[censored]")
            .field("identity", &self.identity)
            .finish()
    }
}

impl SocketBuilder {
    /// Creates a builder.
    ///
    /// # Parameters
    /// * `info` - the instance, used to verify the server identity.
    /// * `server_ca_cert` - the instance server CA certificate, from
    ///   [InstanceMetadata][crate::sqladmin::InstanceMetadata].
    /// * `client_cert` - the ephemeral client certificate.
    /// * `private_key` - the PEM-encoded private key for `client_cert`.
    pub fn new<K: Into<String>>(
        info: InstanceConnectionInfo,
        server_ca_cert: &SslCert,
        client_cert: &SslCert,
        private_key: K,
    ) -> Self {
        Self {
            info,
            server_ca_cert: server_ca_cert.cert.clone(),
            client_cert: client_cert.cert.clone(),
            private_key: private_key.into(),
            identity: None,
        }
    }

    /// Replaces the server identity check.
    ///
    /// The default is a [CommonNameCheck] for the builder instance.
    pub fn with_identity_check(mut self, v: Arc<dyn ServerIdentityCheck>) -> Self {
        self.identity = Some(v);
        self
    }

    /// Creates the TLS client configuration.
    ///
    /// Uses the process default crypto provider, if one is installed.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = crypto_provider()?;
        let mut roots = RootCertStore::empty();
        for cert in CertificateDer::pem_slice_iter(self.server_ca_cert.as_bytes()) {
            roots.add(cert.map_err(Error::tls)?).map_err(Error::tls)?;
        }
        if roots.is_empty() {
            return Err(Error::tls("the server CA certificate is empty"));
        }
        let client_chain = CertificateDer::pem_slice_iter(self.client_cert.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::tls)?;
        let key = PrivateKeyDer::from_pem_slice(self.private_key.as_bytes()).map_err(Error::tls)?;

        let identity = self
            .identity
            .clone()
            .unwrap_or_else(|| Arc::new(CommonNameCheck::new(&self.info)));
        let verifier =
            InstanceCertVerifier::new(roots, provider.signature_verification_algorithms, identity);
        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(Error::tls)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_auth_cert(client_chain, key)
            .map_err(Error::tls)?;
        Ok(Arc::new(config))
    }

    /// Connects to `host` on the [SERVER_PROXY_PORT] and completes the TLS
    /// handshake.
    ///
    /// `host` is an IP address or, for Private Service Connect, a DNS name.
    pub async fn connect(&self, host: &str, cancel: &CancellationToken) -> Result<SecureSocket> {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            s = TcpStream::connect((host, SERVER_PROXY_PORT)) => s.map_err(Error::io)?,
        };
        self.connect_stream(host, stream, cancel).await
    }

    /// Completes the TLS handshake over an existing TCP connection.
    pub async fn connect_stream(
        &self,
        host: &str,
        stream: TcpStream,
        cancel: &CancellationToken,
    ) -> Result<SecureSocket> {
        let connector = TlsConnector::from(self.client_config()?);
        let server_name = ServerName::try_from(host.to_string()).map_err(Error::tls)?;
        let inner = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            s = connector.connect(server_name, stream) => s.map_err(handshake_error)?,
        };
        tracing::debug!(
            host,
            instance = %self.info,
            "established TLS connection to instance"
        );
        Ok(SecureSocket { inner })
    }
}

/// Opens a TLS connection to `host` using the default identity check.
///
/// A shorthand for [SocketBuilder::new] followed by [SocketBuilder::connect].
pub async fn build_socket(
    server_ca_cert: &SslCert,
    client_cert: &SslCert,
    private_key: &str,
    host: &str,
    info: &InstanceConnectionInfo,
    cancel: &CancellationToken,
) -> Result<SecureSocket> {
    SocketBuilder::new(info.clone(), server_ca_cert, client_cert, private_key)
        .connect(host, cancel)
        .await
}

fn handshake_error(e: std::io::Error) -> Error {
    match verifier::identity_error(&e) {
        Some(identity) => identity.into(),
        None => Error::tls(e),
    }
}

fn crypto_provider() -> Result<Arc<CryptoProvider>> {
    match CryptoProvider::get_default() {
        Some(p) => Ok(p.clone()),
        None => default_crypto_provider(),
    }
}

#[cfg(feature = "default-rustls-provider")]
fn default_crypto_provider() -> Result<Arc<CryptoProvider>> {
    Ok(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

#[cfg(not(feature = "default-rustls-provider"))]
fn default_crypto_provider() -> Result<Arc<CryptoProvider>> {
    Err(Error::tls(
        "no rustls crypto provider is installed, call `CryptoProvider::install_default()`",
    ))
}

/// An established TLS connection to an instance.
///
/// Hand this value to the database driver. The connection is fully
/// established, drivers must not attempt to connect it again.
#[pin_project::pin_project]
pub struct SecureSocket {
    #[pin]
    inner: TlsStream<TcpStream>,
}

impl SecureSocket {
    /// Returns the socket itself.
    ///
    /// Some drivers call a connect method on the transport they are given.
    /// The socket is already connected, so this performs no I/O and never
    /// starts a second handshake.
    pub fn connect(self) -> Self {
        self
    }

    /// The underlying TLS stream.
    pub fn get_ref(&self) -> &TlsStream<TcpStream> {
        &self.inner
    }

    /// The address of the instance server proxy.
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.get_ref().0.peer_addr()
    }

    /// Consumes the socket, returning the underlying TLS stream.
    pub fn into_inner(self) -> TlsStream<TcpStream> {
        self.inner
    }
}

impl std::fmt::Debug for SecureSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSocket")
            .field("peer_addr", &self.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for SecureSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl AsyncWrite for SecureSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[std::io::IoSlice<'_>],
    ) -> Poll<std::io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
