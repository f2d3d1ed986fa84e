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

//! Fetches instance metadata and ephemeral certificates from the
//! [SQL Admin API].
//!
//! The [SqlAdminFetcher] makes two independent calls. [fetch_metadata]
//! returns the instance addresses, its server CA certificate, and the names
//! used to verify the server identity. [fetch_ephemeral_certificate] signs a
//! caller-supplied public key and returns a short-lived client certificate.
//!
//! Both calls are retried on transient failures. The responses are
//! validated before any value is returned, a missing or inconsistent field
//! fails the call with a specific [ErrorCode].
//!
//! # Example
//! ```
//! # use google_cloud_sql_connector::sqladmin::SqlAdminFetcher;
//! # use google_cloud_sql_connector::token::{AccessToken, TokenProvider};
//! # use std::sync::Arc;
//! # #[derive(Debug)]
//! # struct MyCredentials;
//! # #[async_trait::async_trait]
//! # impl TokenProvider for MyCredentials {
//! #     async fn token(&self) -> google_cloud_sql_connector::Result<AccessToken> {
//! #         Ok(AccessToken { token: "test-only".into(), expires_at: None })
//! #     }
//! # }
//! let fetcher = SqlAdminFetcher::builder()
//!     .with_credentials(Arc::new(MyCredentials))
//!     .with_user_agent("my-application/1.0")
//!     .build()?;
//! # Ok::<(), google_cloud_sql_connector::error::Error>(())
//! ```
//!
//! [SQL Admin API]: https://cloud.google.com/sql/docs/mysql/admin-api
//! [fetch_metadata]: SqlAdminFetcher::fetch_metadata
//! [fetch_ephemeral_certificate]: SqlAdminFetcher::fetch_ephemeral_certificate

mod model;
mod rules;

use crate::Result;
use crate::backoff_policy::{BackoffPolicy, ExponentialBackoff};
use crate::error::{Error, ErrorCode};
use crate::instance::InstanceConnectionInfo;
use crate::ip_addresses::IpAddresses;
use crate::retry_loop::retry_loop;
use crate::retry_policy::{RetryPolicy, SqlAdminRetryPolicy};
use crate::ssl_cert::{SslCert, nearest_expiration, parse_cert};
use crate::token::{AccessToken, AuthType, TokenProvider};
use http::Method;
use model::{ConnectSettings, GenerateEphemeralCertRequest, GenerateEphemeralCertResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

const DEFAULT_UNIVERSE_DOMAIN: &str = "googleapis.com";
const USER_AGENT_PRODUCT: &str = "cloud-sql-rust-connector";
const NO_ACCESS_TOKEN: &str = "Failed to get access token for automatic IAM authentication.";

/// The connection metadata of an instance.
///
/// Created by [SqlAdminFetcher::fetch_metadata]. All the fields have been
/// validated: at least one address is present, and the server CA certificate
/// has an expiration time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// The instance addresses.
    pub ip_addresses: IpAddresses,

    /// The CA certificate that signs the server certificate.
    pub server_ca_cert: SslCert,

    /// The server CA mode, such as `GOOGLE_MANAGED_INTERNAL_CA` or
    /// `GOOGLE_MANAGED_CAS_CA`. Empty if the service did not report one.
    pub server_ca_mode: String,

    /// The DNS name in the server certificate.
    ///
    /// Used to verify the server identity in the newer server CA modes.
    /// Empty if the service did not report one.
    pub dns_name: String,
}

/// A client for the SQL Admin API operations used by the connector.
///
/// The fetcher has no mutable state, it is cheap to clone and safe to share
/// between concurrent requests.
#[derive(Clone, Debug)]
pub struct SqlAdminFetcher {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
    credentials: Arc<dyn TokenProvider>,
    login_credentials: Arc<dyn TokenProvider>,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
}

impl SqlAdminFetcher {
    /// Returns a builder for [SqlAdminFetcher].
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The SQL Admin API root URL used by this fetcher.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The `User-Agent` header sent by this fetcher.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetches the connection metadata for an instance.
    ///
    /// # Errors
    /// * [ErrorCode::NoMetadataResponse] if the response is empty or is not
    ///   a JSON object.
    /// * [ErrorCode::NoIpAddress] if the instance has no supported address.
    /// * [ErrorCode::NoCertificate] if the server CA certificate or its
    ///   expiration is missing.
    /// * [ErrorCode::NoRegion] if the response has no region.
    /// * [ErrorCode::RegionMismatch] if the instance is not in the region
    ///   named by `info`.
    pub async fn fetch_metadata(
        &self,
        info: &InstanceConnectionInfo,
        cancel: &CancellationToken,
    ) -> Result<InstanceMetadata> {
        let url = format!(
            "{}/sql/v1beta4/projects/{}/instances/{}/connectSettings",
            self.endpoint,
            info.project_id(),
            info.instance_id()
        );
        let payload = self
            .execute::<()>(Method::GET, &url, None, cancel)
            .await?;
        let settings = decode::<ConnectSettings>(&payload, info)?;
        let metadata = validate_settings(&settings, info)?;
        tracing::debug!(
            project_id = info.project_id(),
            instance_id = info.instance_id(),
            server_ca_mode = %metadata.server_ca_mode,
            "fetched instance metadata"
        );
        Ok(metadata)
    }

    /// Obtains an ephemeral client certificate for `public_key`.
    ///
    /// With [AuthType::Iam] the request includes an access token from the
    /// login credentials, and the returned expiration is capped at the token
    /// expiration.
    ///
    /// # Errors
    /// * [ErrorCode::NoAccessToken] if [AuthType::Iam] is requested and the
    ///   login credentials cannot produce an access token.
    /// * [ErrorCode::NoMetadataResponse] if the response is empty or is not
    ///   a JSON object.
    /// * [ErrorCode::NoEphemeralCertificate] if the response has no
    ///   certificate, or the certificate cannot be parsed.
    pub async fn fetch_ephemeral_certificate(
        &self,
        info: &InstanceConnectionInfo,
        public_key: &str,
        auth_type: AuthType,
        cancel: &CancellationToken,
    ) -> Result<SslCert> {
        let (access_token, token_expiration) = match auth_type {
            AuthType::Password => (None, None),
            AuthType::Iam => {
                let token = self.login_token(cancel).await?;
                (Some(token.token), token.expires_at)
            }
        };
        let request = GenerateEphemeralCertRequest {
            public_key: public_key.to_string(),
            access_token,
        };
        let url = format!(
            "{}/sql/v1beta4/projects/{}/instances/{}:generateEphemeralCert",
            self.endpoint,
            info.project_id(),
            info.instance_id()
        );
        let payload = self
            .execute(Method::POST, &url, Some(&request), cancel)
            .await?;
        let response = decode::<GenerateEphemeralCertResponse>(&payload, info)?;
        let cert = response
            .ephemeral_cert
            .and_then(|c| c.cert)
            .filter(|c| !c.is_empty())
            .ok_or_else(no_ephemeral_certificate)?;
        let parsed = parse_cert(&cert).map_err(|e| {
            Error::connector_with_source(
                ErrorCode::NoEphemeralCertificate,
                NO_EPHEMERAL_CERTIFICATE,
                e,
            )
        })?;
        let expiration_time = nearest_expiration(parsed.expiration_time, token_expiration);
        tracing::debug!(
            project_id = info.project_id(),
            instance_id = info.instance_id(),
            ?auth_type,
            %expiration_time,
            "fetched ephemeral certificate"
        );
        Ok(SslCert {
            cert: parsed.cert,
            expiration_time,
        })
    }

    async fn login_token(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            t = self.login_credentials.token() => t,
        };
        let token = token.map_err(|e| {
            Error::connector_with_source(ErrorCode::NoAccessToken, NO_ACCESS_TOKEN, e)
        })?;
        if token.token.is_empty() {
            return Err(Error::connector(ErrorCode::NoAccessToken, NO_ACCESS_TOKEN));
        }
        Ok(token)
    }

    async fn execute<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<bytes::Bytes>
    where
        B: Serialize + Sync,
    {
        let attempt = || self.attempt(method.clone(), url, body);
        retry_loop(
            attempt,
            tokio::time::sleep,
            method.clone(),
            cancel,
            self.retry_policy.as_ref(),
            self.backoff_policy.as_ref(),
        )
        .await
    }

    async fn attempt<B>(&self, method: Method, url: &str, body: Option<&B>) -> Result<bytes::Bytes>
    where
        B: Serialize + Sync,
    {
        let token = self.credentials.token().await?;
        let mut builder = self
            .client
            .request(method, url)
            .bearer_auth(&token.token)
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(send_error)?;
        let status = response.status();
        let payload = response.bytes().await.map_err(send_error)?;
        if !status.is_success() {
            return Err(Error::http(status.as_u16(), payload));
        }
        Ok(payload)
    }
}

/// A builder for [SqlAdminFetcher].
///
/// Only the credentials are required, all other options have defaults.
#[derive(Debug)]
pub struct Builder {
    endpoint: Option<String>,
    universe_domain: Option<String>,
    user_agent: Option<String>,
    credentials: Option<Arc<dyn TokenProvider>>,
    login_credentials: Option<Arc<dyn TokenProvider>>,
    retry_policy: Arc<dyn RetryPolicy>,
    backoff_policy: Arc<dyn BackoffPolicy>,
    http_client: Option<reqwest::Client>,
}

impl Builder {
    /// Creates a builder with the default options and no credentials.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            universe_domain: None,
            user_agent: None,
            credentials: None,
            login_credentials: None,
            retry_policy: Arc::new(SqlAdminRetryPolicy::default()),
            backoff_policy: Arc::new(ExponentialBackoff::default()),
            http_client: None,
        }
    }

    /// Sets the SQL Admin API root URL.
    ///
    /// Defaults to `https://sqladmin.googleapis.com`, or to
    /// `https://sqladmin.{universe_domain}` if a universe domain is set.
    pub fn with_endpoint<V: Into<String>>(mut self, v: V) -> Self {
        self.endpoint = Some(v.into());
        self
    }

    /// Sets the universe domain used to compute the default endpoint.
    pub fn with_universe_domain<V: Into<String>>(mut self, v: V) -> Self {
        self.universe_domain = Some(v.into());
        self
    }

    /// Adds an application-specific value to the `User-Agent` header.
    pub fn with_user_agent<V: Into<String>>(mut self, v: V) -> Self {
        self.user_agent = Some(v.into());
        self
    }

    /// Sets the credentials used to call the SQL Admin API.
    ///
    /// The tokens must be valid for the
    /// [SQL_ADMIN_SCOPE][crate::token::SQL_ADMIN_SCOPE] scope.
    pub fn with_credentials(mut self, v: Arc<dyn TokenProvider>) -> Self {
        self.credentials = Some(v);
        self
    }

    /// Sets the credentials used for IAM database authentication.
    ///
    /// The tokens must be valid for the
    /// [SQL_LOGIN_SCOPE][crate::token::SQL_LOGIN_SCOPE] scope. Defaults to the
    /// credentials set with [with_credentials][Builder::with_credentials].
    pub fn with_login_credentials(mut self, v: Arc<dyn TokenProvider>) -> Self {
        self.login_credentials = Some(v);
        self
    }

    /// Replaces the default retry policy.
    pub fn with_retry_policy<V: RetryPolicy + 'static>(mut self, v: V) -> Self {
        self.retry_policy = Arc::new(v);
        self
    }

    /// Replaces the default backoff policy.
    pub fn with_backoff_policy<V: BackoffPolicy + 'static>(mut self, v: V) -> Self {
        self.backoff_policy = Arc::new(v);
        self
    }

    /// Uses a pre-configured HTTP client.
    pub fn with_http_client(mut self, v: reqwest::Client) -> Self {
        self.http_client = Some(v);
        self
    }

    /// Creates the fetcher.
    ///
    /// Fails with a configuration error if no credentials were set, or if the
    /// HTTP client cannot be created.
    pub fn build(self) -> Result<SqlAdminFetcher> {
        let credentials = self.credentials.ok_or_else(|| {
            Error::configuration("missing credentials, use `Builder::with_credentials()`")
        })?;
        let login_credentials = self
            .login_credentials
            .unwrap_or_else(|| credentials.clone());
        let client = match self.http_client {
            Some(c) => c,
            None => reqwest::Client::builder()
                .build()
                .map_err(Error::configuration)?,
        };
        let endpoint = self.endpoint.unwrap_or_else(|| {
            let universe_domain = self
                .universe_domain
                .as_deref()
                .unwrap_or(DEFAULT_UNIVERSE_DOMAIN);
            format!("https://sqladmin.{universe_domain}")
        });
        let user_agent = match self.user_agent {
            Some(ua) if !ua.is_empty() => format!("{} {ua}", default_user_agent()),
            _ => default_user_agent(),
        };
        Ok(SqlAdminFetcher {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            user_agent,
            credentials,
            login_credentials,
            retry_policy: self.retry_policy,
            backoff_policy: self.backoff_policy,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_user_agent() -> String {
    format!("{USER_AGENT_PRODUCT}/{}", env!("CARGO_PKG_VERSION"))
}

fn send_error(e: reqwest::Error) -> Error {
    if e.is_builder() {
        // An invalid endpoint or header, the request was never sent.
        Error::configuration(e)
    } else if e.is_timeout() {
        Error::timeout(e)
    } else {
        Error::io(e)
    }
}

/// Decodes a response that must be a JSON object.
fn decode<T: DeserializeOwned>(payload: &[u8], info: &InstanceConnectionInfo) -> Result<T> {
    let value = serde_json::from_slice::<serde_json::Value>(payload)
        .map_err(|e| no_metadata_response(info, Some(e)))?;
    if !value.is_object() {
        return Err(no_metadata_response(info, None));
    }
    serde_json::from_value::<T>(value).map_err(|e| no_metadata_response(info, Some(e)))
}

fn validate_settings(
    settings: &ConnectSettings,
    info: &InstanceConnectionInfo,
) -> Result<InstanceMetadata> {
    let ip_addresses = rules::ip_addresses(settings);
    if ip_addresses.is_empty() {
        return Err(Error::connector(
            ErrorCode::NoIpAddress,
            "Cannot connect to instance, it has no supported IP addresses",
        ));
    }

    let server_ca_cert = server_ca_cert(settings)?;

    let region = settings
        .region
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| {
            Error::connector(
                ErrorCode::NoRegion,
                "Cannot connect to instance, no valid region found",
            )
        })?;
    if region != info.region_id() {
        return Err(Error::connector(
            ErrorCode::RegionMismatch,
            format!(
                "Provided region was mismatched. Got {region}, want {}",
                info.region_id()
            ),
        ));
    }

    Ok(InstanceMetadata {
        ip_addresses,
        server_ca_cert,
        server_ca_mode: settings.server_ca_mode.clone().unwrap_or_default(),
        dns_name: rules::server_name(settings),
    })
}

const NO_CERTIFICATE: &str = "Cannot connect to instance, no valid CA certificate found";
const NO_EPHEMERAL_CERTIFICATE: &str =
    "Cannot connect to instance, failed to retrieve an ephemeral certificate";

fn server_ca_cert(settings: &ConnectSettings) -> Result<SslCert> {
    let no_certificate = || Error::connector(ErrorCode::NoCertificate, NO_CERTIFICATE);
    let record = settings.server_ca_cert.as_ref().ok_or_else(no_certificate)?;
    let cert = record
        .cert
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(no_certificate)?;
    let expiration_time = record
        .expiration_time
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(no_certificate)?;
    let expiration_time = OffsetDateTime::parse(expiration_time, &Rfc3339)
        .map_err(|e| Error::connector_with_source(ErrorCode::NoCertificate, NO_CERTIFICATE, e))?;
    Ok(SslCert {
        cert: cert.to_string(),
        expiration_time,
    })
}

fn no_metadata_response(
    info: &InstanceConnectionInfo,
    source: Option<serde_json::Error>,
) -> Error {
    let message = format!(
        "Failed to find metadata on project id: {} and instance id: {}. Ensure network \
         connectivity and validate the provided `instanceConnectionName` config value",
        info.project_id(),
        info.instance_id()
    );
    match source {
        None => Error::connector(ErrorCode::NoMetadataResponse, message),
        Some(e) => Error::connector_with_source(ErrorCode::NoMetadataResponse, message, e),
    }
}

fn no_ephemeral_certificate() -> Error {
    Error::connector(ErrorCode::NoEphemeralCertificate, NO_EPHEMERAL_CERTIFICATE)
}
