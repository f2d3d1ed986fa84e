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

//! These tests connect the [SocketBuilder] to a local TLS server. The server
//! mimics the Cloud SQL server proxy: it presents a certificate signed by the
//! instance server CA, and requires a client certificate.

#[cfg(test)]
mod tests {
    use google_cloud_sql_connector::error::ErrorCode;
    use google_cloud_sql_connector::instance::InstanceConnectionInfo;
    use google_cloud_sql_connector::socket::{DnsNameCheck, SocketBuilder};
    use google_cloud_sql_connector::ssl_cert::SslCert;
    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
        IsCa, Issuer, KeyPair,
    };
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::server::WebPkiClientVerifier;
    use rustls::{RootCertStore, ServerConfig};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use time::macros::datetime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::TlsAcceptor;
    use tokio_util::sync::CancellationToken;

    type Result<T> = anyhow::Result<T>;

    struct TestCa {
        pem: String,
        der: CertificateDer<'static>,
        issuer: Issuer<'static, KeyPair>,
    }

    impl TestCa {
        fn new(common_name: &str) -> Result<Self> {
            let key = KeyPair::generate()?;
            let mut params = CertificateParams::new(Vec::<String>::new())?;
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.distinguished_name = subject(common_name);
            let cert = params.self_signed(&key)?;
            Ok(Self {
                pem: cert.pem(),
                der: cert.der().clone(),
                issuer: Issuer::new(params, key),
            })
        }

        fn as_ssl_cert(&self) -> SslCert {
            SslCert {
                cert: self.pem.clone(),
                expiration_time: datetime!(2033-01-06 10:00 UTC),
            }
        }
    }

    struct Leaf {
        pem: String,
        der: CertificateDer<'static>,
        key: KeyPair,
    }

    impl Leaf {
        fn new(
            ca: &TestCa,
            common_name: &str,
            sans: Vec<String>,
            usage: ExtendedKeyUsagePurpose,
        ) -> Result<Self> {
            let key = KeyPair::generate()?;
            let mut params = CertificateParams::new(sans)?;
            params.distinguished_name = subject(common_name);
            params.extended_key_usages = vec![usage];
            let cert = params.signed_by(&key, &ca.issuer)?;
            Ok(Self {
                pem: cert.pem(),
                der: cert.der().clone(),
                key,
            })
        }

        fn private_key(&self) -> PrivateKeyDer<'static> {
            PrivatePkcs8KeyDer::from(self.key.serialize_der()).into()
        }
    }

    fn subject(common_name: &str) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn
    }

    fn info() -> InstanceConnectionInfo {
        InstanceConnectionInfo::new("my-project", "us-central1", "my-instance")
    }

    /// The certificates for one test.
    struct Fixture {
        server_ca: TestCa,
        client_ca: TestCa,
        client: Leaf,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let server_ca = TestCa::new("Google Cloud SQL Server CA")?;
            let client_ca = TestCa::new("Google Cloud SQL Signing CA")?;
            let client = Leaf::new(
                &client_ca,
                "ephemeral",
                Vec::new(),
                ExtendedKeyUsagePurpose::ClientAuth,
            )?;
            Ok(Self {
                server_ca,
                client_ca,
                client,
            })
        }

        fn server_leaf(&self, common_name: &str, sans: Vec<String>) -> Result<Leaf> {
            Leaf::new(
                &self.server_ca,
                common_name,
                sans,
                ExtendedKeyUsagePurpose::ServerAuth,
            )
        }

        fn builder(&self) -> SocketBuilder {
            let client_cert = SslCert {
                cert: self.client.pem.clone(),
                expiration_time: datetime!(2030-01-01 00:00 UTC),
            };
            SocketBuilder::new(
                info(),
                &self.server_ca.as_ssl_cert(),
                &client_cert,
                self.client.key.serialize_pem(),
            )
        }
    }

    /// Starts a TLS server that answers `ping` with `pong`.
    async fn start_server(fixture: &Fixture, leaf: &Leaf) -> Result<SocketAddr> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut client_roots = RootCertStore::empty();
        client_roots.add(fixture.client_ca.der.clone())?;
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(client_roots), provider.clone())
                .build()?;
        let config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(vec![leaf.der.clone()], leaf.private_key())?;
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut tls) = acceptor.accept(stream).await else {
                return;
            };
            let mut buf = [0_u8; 4];
            if tls.read_exact(&mut buf).await.is_ok() && &buf == b"ping" {
                let _ = tls.write_all(b"pong").await;
                let _ = tls.shutdown().await;
            }
        });
        Ok(addr)
    }

    #[tokio::test]
    async fn common_name_match() -> Result<()> {
        let fixture = Fixture::new()?;
        let leaf = fixture.server_leaf("my-project:my-instance", Vec::new())?;
        let addr = start_server(&fixture, &leaf).await?;

        let stream = TcpStream::connect(addr).await?;
        let socket = fixture
            .builder()
            .connect_stream("127.0.0.1", stream, &CancellationToken::new())
            .await?;
        assert_eq!(socket.peer_addr()?, addr);

        let mut socket = socket.connect();
        socket.write_all(b"ping").await?;
        let mut buf = [0_u8; 4];
        socket.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"pong");
        Ok(())
    }

    #[tokio::test]
    async fn common_name_mismatch() -> Result<()> {
        let fixture = Fixture::new()?;
        let leaf = fixture.server_leaf("other-project:other-instance", Vec::new())?;
        let addr = start_server(&fixture, &leaf).await?;

        let stream = TcpStream::connect(addr).await?;
        let err = fixture
            .builder()
            .connect_stream("127.0.0.1", stream, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.code(),
            Some(ErrorCode::CertificateSubjectMismatch),
            "{err:?}"
        );
        assert_eq!(
            err.subject_names(),
            Some(("other-project:other-instance", "my-project:my-instance"))
        );
        let message = err.to_string();
        assert!(
            message.contains(
                "Certificate had CN other-project:other-instance, expected my-project:my-instance"
            ),
            "{message}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_server_ca() -> Result<()> {
        let fixture = Fixture::new()?;
        let other_ca = TestCa::new("Some Other CA")?;
        let leaf = Leaf::new(
            &other_ca,
            "my-project:my-instance",
            Vec::new(),
            ExtendedKeyUsagePurpose::ServerAuth,
        )?;
        let addr = start_server(&fixture, &leaf).await?;

        let stream = TcpStream::connect(addr).await?;
        let err = fixture
            .builder()
            .connect_stream("127.0.0.1", stream, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_tls(), "{err:?}");
        assert_eq!(err.code(), None, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn dns_name_check() -> Result<()> {
        let fixture = Fixture::new()?;
        let leaf = fixture.server_leaf(
            "Cloud SQL Server",
            vec!["abcde.12345.us-central1.sql.goog".to_string()],
        )?;
        let addr = start_server(&fixture, &leaf).await?;

        let stream = TcpStream::connect(addr).await?;
        let check = DnsNameCheck::new("abcde.12345.us-central1.sql.goog")?;
        let mut socket = fixture
            .builder()
            .with_identity_check(Arc::new(check))
            .connect_stream("10.0.0.1", stream, &CancellationToken::new())
            .await?;
        socket.write_all(b"ping").await?;
        let mut buf = [0_u8; 4];
        socket.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"pong");
        Ok(())
    }

    #[tokio::test]
    async fn dns_name_mismatch() -> Result<()> {
        let fixture = Fixture::new()?;
        let leaf = fixture.server_leaf(
            "Cloud SQL Server",
            vec!["other.12345.us-central1.sql.goog".to_string()],
        )?;
        let addr = start_server(&fixture, &leaf).await?;

        let stream = TcpStream::connect(addr).await?;
        let check = DnsNameCheck::new("abcde.12345.us-central1.sql.goog")?;
        let err = fixture
            .builder()
            .with_identity_check(Arc::new(check))
            .connect_stream("10.0.0.1", stream, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.subject_names(),
            Some((
                "other.12345.us-central1.sql.goog",
                "abcde.12345.us-central1.sql.goog"
            )),
            "{err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_handshake() -> Result<()> {
        let fixture = Fixture::new()?;
        // The listener accepts the TCP connection but never answers the
        // TLS handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

        let stream = TcpStream::connect(addr).await?;
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            child.cancel();
        });
        let err = fixture
            .builder()
            .connect_stream("127.0.0.1", stream, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        drop(server);
        Ok(())
    }
}
