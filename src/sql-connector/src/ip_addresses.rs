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

//! Types and functions to choose the address used to connect to an instance.

use crate::Result;
use crate::error::{Error, ErrorCode};

/// The connectivity modes of a Cloud SQL instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpAddressType {
    /// The instance public IP address.
    Public,
    /// The instance private IP address, reachable from its VPC network.
    Private,
    /// The Private Service Connect DNS name.
    Psc,
}

impl std::str::FromStr for IpAddressType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Self::Public),
            "PRIVATE" => Ok(Self::Private),
            "PSC" => Ok(Self::Psc),
            _ => Err(format!(
                "invalid IP address type {s}, expected PUBLIC, PRIVATE, or PSC"
            )),
        }
    }
}

impl std::fmt::Display for IpAddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
            Self::Psc => "PSC",
        };
        f.write_str(s)
    }
}

/// The addresses of an instance, indexed by connectivity mode.
///
/// Not all instances have all types of addresses. The SQL Admin fetcher never
/// returns a value where all the addresses are missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpAddresses {
    pub public: Option<String>,
    pub private: Option<String>,
    pub psc: Option<String>,
}

impl IpAddresses {
    /// Returns true if no address is populated.
    pub fn is_empty(&self) -> bool {
        self.public.is_none() && self.private.is_none() && self.psc.is_none()
    }
}

/// Returns the address for the requested connectivity mode.
///
/// The lookup never falls back to a different type of address. If `wanted`
/// is `None` the function fails with [ErrorCode::NoAddress].
///
/// # Example
/// ```
/// # use google_cloud_sql_connector::ip_addresses::*;
/// let addresses = IpAddresses {
///     public: Some("10.0.0.1".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(select_ip_address(&addresses, Some(IpAddressType::Public))?, "10.0.0.1");
/// assert!(select_ip_address(&addresses, Some(IpAddressType::Private)).is_err());
/// # Ok::<(), google_cloud_sql_connector::error::Error>(())
/// ```
pub fn select_ip_address(addresses: &IpAddresses, wanted: Option<IpAddressType>) -> Result<&str> {
    match wanted {
        Some(IpAddressType::Public) => addresses.public.as_deref().ok_or_else(|| {
            Error::connector(
                ErrorCode::NoPublicAddress,
                "Cannot connect to instance, public Ip address not found",
            )
        }),
        Some(IpAddressType::Private) => addresses.private.as_deref().ok_or_else(|| {
            Error::connector(
                ErrorCode::NoPrivateAddress,
                "Cannot connect to instance, private Ip address not found",
            )
        }),
        Some(IpAddressType::Psc) => addresses.psc.as_deref().ok_or_else(|| {
            Error::connector(
                ErrorCode::NoPscAddress,
                "Cannot connect to instance, PSC address not found",
            )
        }),
        None => Err(Error::connector(
            ErrorCode::NoAddress,
            "Cannot connect to instance, it has no supported IP addresses",
        )),
    }
}
