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

//! Types and functions to work with the certificates used by the connector.

use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;
use time::OffsetDateTime;

/// A PEM-encoded certificate and its expiration time.
///
/// The connector uses two certificates: the server CA certificate, which
/// rotates rarely, and the ephemeral client certificate, which is only valid
/// for minutes or hours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SslCert {
    /// The certificate in PEM format.
    pub cert: String,

    /// The instant at which the certificate should no longer be used.
    ///
    /// For ephemeral certificates this may be earlier than the expiration
    /// declared in the certificate itself, see [nearest_expiration].
    pub expiration_time: OffsetDateTime,
}

/// The error type for [parse_cert].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ParseCertError {
    #[error("cannot decode the PEM certificate: {0}")]
    Pem(#[from] rustls_pki_types::pem::Error),
    #[error("cannot parse the X.509 certificate: {0}")]
    X509(String),
}

/// Parses a PEM certificate and extracts its expiration time.
///
/// Only the first certificate in `pem` is used.
pub fn parse_cert(pem: &str) -> Result<SslCert, ParseCertError> {
    let der = CertificateDer::from_pem_slice(pem.as_bytes())?;
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| ParseCertError::X509(e.to_string()))?;
    Ok(SslCert {
        cert: pem.to_string(),
        expiration_time: cert.validity().not_after.to_datetime(),
    })
}

/// Returns the earliest of the certificate and token expiration times.
///
/// A certificate obtained with an access token must not be used after the
/// token expires, even when the certificate declares a later expiration.
///
/// # Example
/// ```
/// # use google_cloud_sql_connector::ssl_cert::nearest_expiration;
/// use time::{Duration, OffsetDateTime};
/// let cert = OffsetDateTime::now_utc() + Duration::hours(1);
/// let token = OffsetDateTime::now_utc() + Duration::minutes(5);
/// assert_eq!(nearest_expiration(cert, Some(token)), token);
/// assert_eq!(nearest_expiration(cert, None), cert);
/// ```
pub fn nearest_expiration(
    cert_expiration: OffsetDateTime,
    token_expiration: Option<OffsetDateTime>,
) -> OffsetDateTime {
    match token_expiration {
        Some(token) if token < cert_expiration => token,
        _ => cert_expiration,
    }
}
