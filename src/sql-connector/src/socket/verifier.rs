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

//! Verifies the identity of Cloud SQL servers.
//!
//! Cloud SQL server certificates identify the instance with a subject common
//! name of the form `{project}:{instance}`, and the connector usually
//! connects to a bare IP address. The default hostname verification of
//! [rustls] cannot work in this case. [InstanceCertVerifier] validates the
//! certificate chain against the instance server CA certificate, and then
//! delegates the identity decision to a [ServerIdentityCheck].

use crate::error::Error;
use crate::instance::InstanceConnectionInfo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_cert_signed_by_trust_anchor, verify_server_name};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;

/// The error returned by a [ServerIdentityCheck].
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// The server certificate cannot be parsed, or has an empty subject.
    #[error("No certificate to verify")]
    NoCertificate,
    /// The server certificate identifies a different server.
    #[error("Certificate had CN {observed}, expected {expected}")]
    SubjectMismatch { observed: String, expected: String },
}

impl From<IdentityError> for Error {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::NoCertificate => Error::connector(
                crate::error::ErrorCode::NoCertificateToVerify,
                IdentityError::NoCertificate.to_string(),
            ),
            IdentityError::SubjectMismatch { observed, expected } => {
                Error::subject_mismatch(observed, expected)
            }
        }
    }
}

/// Decides if a server certificate belongs to the expected server.
///
/// The check runs during the TLS handshake, after the certificate chain is
/// validated against the server CA certificate.
pub trait ServerIdentityCheck: Send + Sync + std::fmt::Debug {
    fn check(&self, end_entity: &CertificateDer<'_>) -> Result<(), IdentityError>;
}

/// Accepts certificates whose subject common name is `{project}:{instance}`.
///
/// This is the default check.
///
/// # Example
/// ```
/// # use google_cloud_sql_connector::instance::InstanceConnectionInfo;
/// # use google_cloud_sql_connector::socket::CommonNameCheck;
/// let info = InstanceConnectionInfo::new("my-project", "us-central1", "my-instance");
/// let check = CommonNameCheck::new(&info);
/// assert_eq!(check.expected(), "my-project:my-instance");
/// ```
#[derive(Clone, Debug)]
pub struct CommonNameCheck {
    expected: String,
}

impl CommonNameCheck {
    /// Creates a check for the server certificate of `info`.
    pub fn new(info: &InstanceConnectionInfo) -> Self {
        Self {
            expected: info.expected_common_name(),
        }
    }

    /// The common name required by this check.
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

impl ServerIdentityCheck for CommonNameCheck {
    fn check(&self, end_entity: &CertificateDer<'_>) -> Result<(), IdentityError> {
        let (_, cert) = x509_parser::parse_x509_certificate(end_entity.as_ref())
            .map_err(|_| IdentityError::NoCertificate)?;
        let subject = cert.subject();
        if subject.iter().next().is_none() {
            return Err(IdentityError::NoCertificate);
        }
        let observed = subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default();
        if observed != self.expected {
            return Err(IdentityError::SubjectMismatch {
                observed: observed.to_string(),
                expected: self.expected.clone(),
            });
        }
        Ok(())
    }
}

/// Accepts certificates valid for a DNS name.
///
/// Instances using the newer server CA modes present certificates with the
/// instance DNS name, as reported in
/// [InstanceMetadata::dns_name][crate::sqladmin::InstanceMetadata::dns_name].
#[derive(Clone, Debug)]
pub struct DnsNameCheck {
    expected: ServerName<'static>,
}

impl DnsNameCheck {
    /// Creates a check for `dns_name`.
    ///
    /// Fails with a configuration error if `dns_name` is not a valid DNS name.
    pub fn new<V: Into<String>>(dns_name: V) -> crate::Result<Self> {
        let dns_name = dns_name.into();
        let expected = ServerName::try_from(dns_name).map_err(Error::configuration)?;
        Ok(Self { expected })
    }
}

impl ServerIdentityCheck for DnsNameCheck {
    fn check(&self, end_entity: &CertificateDer<'_>) -> Result<(), IdentityError> {
        let parsed =
            ParsedCertificate::try_from(end_entity).map_err(|_| IdentityError::NoCertificate)?;
        verify_server_name(&parsed, &self.expected).map_err(|_| {
            IdentityError::SubjectMismatch {
                observed: presented_dns_names(end_entity),
                expected: self.expected.to_str().into_owned(),
            }
        })
    }
}

fn presented_dns_names(end_entity: &CertificateDer<'_>) -> String {
    use x509_parser::extensions::GeneralName;
    let Ok((_, cert)) = x509_parser::parse_x509_certificate(end_entity.as_ref()) else {
        return String::new();
    };
    cert.subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|gn| match gn {
                    GeneralName::DNSName(n) => Some(*n),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// A [ServerCertVerifier] for Cloud SQL instances.
///
/// Trusts only the instance server CA certificate. The hostname is never
/// checked, the [ServerIdentityCheck] decides if the certificate identifies
/// the expected server.
#[derive(Debug)]
pub(crate) struct InstanceCertVerifier {
    roots: Arc<RootCertStore>,
    supported_algs: WebPkiSupportedAlgorithms,
    identity: Arc<dyn ServerIdentityCheck>,
}

impl InstanceCertVerifier {
    pub(crate) fn new(
        roots: RootCertStore,
        supported_algs: WebPkiSupportedAlgorithms,
        identity: Arc<dyn ServerIdentityCheck>,
    ) -> Self {
        Self {
            roots: Arc::new(roots),
            supported_algs,
            identity,
        }
    }
}

impl ServerCertVerifier for InstanceCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let parsed = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &parsed,
            &self.roots,
            intermediates,
            now,
            self.supported_algs.all,
        )?;
        self.identity.check(end_entity).map_err(|e| {
            rustls::Error::InvalidCertificate(CertificateError::Other(rustls::OtherError(
                Arc::new(e),
            )))
        })?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}

/// Recovers the [IdentityError] from a failed handshake, if any.
pub(crate) fn identity_error(error: &std::io::Error) -> Option<IdentityError> {
    let tls = error.get_ref()?.downcast_ref::<rustls::Error>()?;
    match tls {
        rustls::Error::InvalidCertificate(CertificateError::Other(other)) => {
            other.0.downcast_ref::<IdentityError>().cloned()
        }
        _ => None,
    }
}
