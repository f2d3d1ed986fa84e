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

//! Secure connections to Cloud SQL instances.
//!
//! This crate contains the building blocks used by the Cloud SQL connector:
//!
//! * [sqladmin::SqlAdminFetcher] retrieves the instance metadata and the
//!   ephemeral client certificate from the SQL Admin API.
//! * [ip_addresses::select_ip_address] picks the address to connect to.
//! * [socket::SocketBuilder] opens a mutually authenticated TLS connection
//!   to the instance, verifying the server certificate against the instance
//!   identity.
//! * [ssl_cert::nearest_expiration] reconciles the lifetime of the client
//!   certificate with the lifetime of the IAM login token.
//!
//! Unless otherwise noted these types are intended for the connector and for
//! database driver integrations, not for general application use.

pub mod error;

/// Identifies Cloud SQL instances.
pub mod instance;

pub mod backoff_policy;
pub mod ip_addresses;
pub mod retry_policy;
pub mod socket;
pub mod sqladmin;
pub mod ssl_cert;
pub mod token;

mod retry_loop;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, crate::error::Error>;
