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

//! The error type returned by the connector.
//!
//! All failures, whether they come from the SQL Admin API, the validation of
//! its responses, the credentials, or the TLS handshake, are reported as an
//! [Error]. Validation and trust failures carry a machine-readable
//! [ErrorCode], so applications can distinguish a misconfigured instance from
//! a transient network problem.

use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// The machine-readable codes attached to connector errors.
///
/// Each variant identifies one validation or trust failure. The codes are stable,
/// [ErrorCode::as_str] returns the string form used in logs and messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The SQL Admin API returned an empty or malformed payload.
    NoMetadataResponse,
    /// The instance metadata did not include any supported address.
    NoIpAddress,
    /// A public IP address was requested, but the instance has none.
    NoPublicAddress,
    /// A private IP address was requested, but the instance has none.
    NoPrivateAddress,
    /// A Private Service Connect address was requested, but the instance has none.
    NoPscAddress,
    /// No address type was requested.
    ///
    /// Shares the `ENOSQLADMINIPADDRESS` string form with
    /// [NoIpAddress][ErrorCode::NoIpAddress].
    NoAddress,
    /// The instance metadata did not include a valid server CA certificate.
    NoCertificate,
    /// The SQL Admin API did not return an ephemeral certificate.
    NoEphemeralCertificate,
    /// The instance metadata did not include a region.
    NoRegion,
    /// The instance region differs from the region in the connection name.
    RegionMismatch,
    /// IAM authentication was requested, but no access token is available.
    NoAccessToken,
    /// The server did not present a certificate with a subject.
    NoCertificateToVerify,
    /// The server certificate subject does not match the instance.
    CertificateSubjectMismatch,
    /// The instance connection name is not of the form `project:region:instance`.
    BadConnectionName,
}

impl ErrorCode {
    /// Returns the string form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMetadataResponse => "ENOSQLADMIN",
            Self::NoIpAddress => "ENOSQLADMINIPADDRESS",
            Self::NoPublicAddress => "ENOPUBLICSQLADMINIPADDRESS",
            Self::NoPrivateAddress => "ENOPRIVATESQLADMINIPADDRESS",
            Self::NoPscAddress => "ENOPSCSQLADMINIPADDRESS",
            Self::NoAddress => "ENOSQLADMINIPADDRESS",
            Self::NoCertificate => "ENOSQLADMINCERT",
            Self::NoEphemeralCertificate => "ENOSQLADMINEPH",
            Self::NoRegion => "ENOSQLADMINREGION",
            Self::RegionMismatch => "EBADSQLADMINREGION",
            Self::NoAccessToken => "ENOACCESSTOKEN",
            Self::NoCertificateToVerify => "ENOSQLADMINVERIFYCERT",
            Self::CertificateSubjectMismatch => "EBADSQLADMINVERIFYCERT",
            Self::BadConnectionName => "EBADCONNECTIONNAME",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned by all the functions in this crate.
///
/// The connector reports errors from multiple sources. The SQL Admin API may
/// return an error, the transport may be unable to connect, the response may
/// be incomplete, the credentials may fail, the server may present the wrong
/// certificate, or the application may cancel the operation. This type offers
/// a series of predicates to determine the error kind, and accessors for the
/// most common details.
///
/// # Example
/// ```
/// use google_cloud_sql_connector::error::{Error, ErrorCode};
/// # fn example_function() -> Result<String, Error> {
/// #     Err(Error::connector(ErrorCode::NoRegion, "no region"))
/// # }
/// match example_function() {
///     Err(e) if e.code() == Some(ErrorCode::NoRegion) => { println!("bad metadata {e}"); },
///     Err(e) if e.is_cancelled() => { println!("gave up {e}"); },
///     Err(e) => { println!("some other error {e}"); },
///     Ok(_) => { println!("success, how boring"); },
/// }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<BoxError>,
}

#[derive(Debug)]
enum ErrorKind {
    Connector(ErrorCode, String),
    SubjectMismatch { observed: String, expected: String },
    Http { status_code: u16, payload: bytes::Bytes },
    Io,
    Timeout,
    Cancelled,
    Authentication,
    Tls,
    Configuration,
}

impl Error {
    /// Creates an error with one of the connector [codes][ErrorCode].
    ///
    /// # Example
    /// ```
    /// use google_cloud_sql_connector::error::{Error, ErrorCode};
    /// let error = Error::connector(ErrorCode::NoRegion, "no valid region found");
    /// assert_eq!(error.code(), Some(ErrorCode::NoRegion));
    /// ```
    pub fn connector<M: Into<String>>(code: ErrorCode, message: M) -> Self {
        Self {
            kind: ErrorKind::Connector(code, message.into()),
            source: None,
        }
    }

    /// Creates a connector error with the underlying cause.
    pub fn connector_with_source<M, T>(code: ErrorCode, message: M, source: T) -> Self
    where
        M: Into<String>,
        T: Into<BoxError>,
    {
        Self {
            kind: ErrorKind::Connector(code, message.into()),
            source: Some(source.into()),
        }
    }

    /// Creates an error for a server certificate with the wrong subject.
    pub fn subject_mismatch<O, E>(observed: O, expected: E) -> Self
    where
        O: Into<String>,
        E: Into<String>,
    {
        Self {
            kind: ErrorKind::SubjectMismatch {
                observed: observed.into(),
                expected: expected.into(),
            },
            source: None,
        }
    }

    /// Returns the connector code, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match &self.kind {
            ErrorKind::Connector(code, _) => Some(*code),
            ErrorKind::SubjectMismatch { .. } => Some(ErrorCode::CertificateSubjectMismatch),
            _ => None,
        }
    }

    /// Returns the observed and expected common names of a
    /// [CertificateSubjectMismatch][ErrorCode::CertificateSubjectMismatch] error.
    pub fn subject_names(&self) -> Option<(&str, &str)> {
        match &self.kind {
            ErrorKind::SubjectMismatch { observed, expected } => Some((observed, expected)),
            _ => None,
        }
    }

    /// Returns true if the requested address type is not available.
    ///
    /// This is the case for [NoPublicAddress][ErrorCode::NoPublicAddress],
    /// [NoPrivateAddress][ErrorCode::NoPrivateAddress],
    /// [NoPscAddress][ErrorCode::NoPscAddress], and
    /// [NoAddress][ErrorCode::NoAddress].
    pub fn is_missing_address(&self) -> bool {
        matches!(
            self.code(),
            Some(
                ErrorCode::NoPublicAddress
                    | ErrorCode::NoPrivateAddress
                    | ErrorCode::NoPscAddress
                    | ErrorCode::NoAddress
            )
        )
    }

    /// Creates an error for an unsuccessful HTTP response.
    pub fn http(status_code: u16, payload: bytes::Bytes) -> Self {
        Self {
            kind: ErrorKind::Http {
                status_code,
                payload,
            },
            source: None,
        }
    }

    /// The HTTP status code of an unsuccessful SQL Admin API response.
    pub fn http_status_code(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// The payload of an unsuccessful SQL Admin API response.
    pub fn http_payload(&self) -> Option<&bytes::Bytes> {
        match &self.kind {
            ErrorKind::Http { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Creates an error representing a failure to send a request or receive
    /// a response.
    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: Some(source.into()),
        }
    }

    /// A problem in the transport layer without a full response.
    ///
    /// The connection may have been refused or reset before the service
    /// could respond.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }

    /// Creates an error representing a timeout.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            source: Some(source.into()),
        }
    }

    /// The request could not be completed before its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Creates an error representing a cancelled operation.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            source: None,
        }
    }

    /// The application cancelled the operation.
    ///
    /// This is never the result of a network failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an error representing a failure in a token provider.
    pub fn authentication<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Authentication,
            source: Some(source.into()),
        }
    }

    /// The credentials could not produce an access token.
    pub fn is_authentication(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication)
    }

    /// Creates an error representing a TLS configuration or handshake problem.
    pub fn tls<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Tls,
            source: Some(source.into()),
        }
    }

    /// The TLS configuration could not be created, or the handshake failed
    /// for reasons other than the server identity.
    pub fn is_tls(&self) -> bool {
        matches!(self.kind, ErrorKind::Tls)
    }

    /// Creates an error representing an invalid client configuration.
    pub fn configuration<T: Into<BoxError>>(source: T) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            source: Some(source.into()),
        }
    }

    /// The client could not be created with the given options.
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind, ErrorKind::Configuration)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ErrorKind::Connector(_, message) => write!(f, "{message}"),
            ErrorKind::SubjectMismatch { observed, expected } => {
                write!(f, "Certificate had CN {observed}, expected {expected}")
            }
            ErrorKind::Http {
                status_code,
                payload,
            } => {
                write!(
                    f,
                    "the SQL Admin API returned HTTP status {status_code}, payload={}",
                    String::from_utf8_lossy(payload)
                )
            }
            ErrorKind::Io => write!(f, "cannot send the request or receive the response"),
            ErrorKind::Timeout => write!(f, "the request exceeded its deadline"),
            ErrorKind::Cancelled => write!(f, "the operation was cancelled"),
            ErrorKind::Authentication => write!(f, "cannot obtain an access token"),
            ErrorKind::Tls => write!(f, "cannot establish the TLS connection"),
            ErrorKind::Configuration => write!(f, "invalid connector configuration"),
        }?;
        match &self.source {
            None => Ok(()),
            Some(source) => write!(f, ": {source}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
