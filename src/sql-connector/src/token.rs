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

//! Types and traits to obtain auth [Tokens].
//!
//! The connector does not create or cache credentials. Applications provide
//! an implementation of [TokenProvider], typically backed by the
//! `google-cloud-auth` crate, and the connector treats it as a read-only
//! dependency.
//!
//! [Tokens]: https://cloud.google.com/docs/authentication#token

use crate::Result;
use time::OffsetDateTime;

/// The OAuth2 scope required to call the SQL Admin API.
pub const SQL_ADMIN_SCOPE: &str = "https://www.googleapis.com/auth/sqlservice.admin";

/// The OAuth2 scope required for IAM database authentication.
pub const SQL_LOGIN_SCOPE: &str = "https://www.googleapis.com/auth/sqlservice.login";

/// Represents an access token.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the token does not expire.
    pub expires_at: Option<OffsetDateTime>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies access tokens for the connector.
///
/// Implementations own the token lifecycle, including any caching and
/// refresh. Errors should be created with [Error::authentication].
///
/// [Error::authentication]: crate::error::Error::authentication
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<AccessToken>;
}

/// How the connection authenticates to the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthType {
    /// Built-in database users and passwords.
    #[default]
    Password,
    /// Automatic IAM database authentication.
    ///
    /// The ephemeral certificate embeds an access token for the IAM
    /// principal, and its expiration is capped by the token expiration.
    Iam,
}
