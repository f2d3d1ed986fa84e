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

//! The subset of the SQL Admin API v1beta4 messages used by the connector.
//!
//! All fields are optional, the fetcher validates them before creating any
//! domain object.

use serde::{Deserialize, Serialize};

/// The response for `connect.get`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ConnectSettings {
    pub ip_addresses: Option<Vec<IpMapping>>,
    pub server_ca_cert: Option<SslCertRecord>,
    pub server_ca_mode: Option<String>,
    pub dns_name: Option<String>,
    pub dns_names: Option<Vec<DnsNameMapping>>,
    pub region: Option<String>,
    pub psc_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct IpMapping {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DnsNameMapping {
    pub name: Option<String>,
    pub connection_type: Option<String>,
    pub dns_scope: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct SslCertRecord {
    pub cert: Option<String>,
    /// RFC 3339 timestamp.
    pub expiration_time: Option<String>,
}

/// The request for `connect.generateEphemeralCert`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct GenerateEphemeralCertRequest {
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// The response for `connect.generateEphemeralCert`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct GenerateEphemeralCertResponse {
    pub ephemeral_cert: Option<SslCertRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_settings() -> anyhow::Result<()> {
        let input = json!({
            "kind": "sql#connectSettings",
            "ipAddresses": [
                {"type": "PRIMARY", "ipAddress": "0.0.0.0"},
                {"type": "OUTGOING", "ipAddress": "0.0.0.1"},
            ],
            "serverCaCert": {"cert": "-----BEGIN CERTIFICATE-----", "expirationTime": "2033-01-06T10:00:00.232Z"},
            "serverCaMode": "GOOGLE_MANAGED_CAS_CA",
            "dnsName": "abcde.12345.us-central1.sql.goog",
            "dnsNames": [
                {"name": "abcde.12345.us-central1.sql.goog", "connectionType": "PRIVATE_SERVICE_CONNECT", "dnsScope": "INSTANCE"},
            ],
            "region": "us-east1",
            "pscEnabled": true,
            "databaseVersion": "POSTGRES_16",
        });
        let got = serde_json::from_value::<ConnectSettings>(input)?;
        let want = ConnectSettings {
            ip_addresses: Some(vec![
                IpMapping {
                    kind: Some("PRIMARY".into()),
                    ip_address: Some("0.0.0.0".into()),
                },
                IpMapping {
                    kind: Some("OUTGOING".into()),
                    ip_address: Some("0.0.0.1".into()),
                },
            ]),
            server_ca_cert: Some(SslCertRecord {
                cert: Some("-----BEGIN CERTIFICATE-----".into()),
                expiration_time: Some("2033-01-06T10:00:00.232Z".into()),
            }),
            server_ca_mode: Some("GOOGLE_MANAGED_CAS_CA".into()),
            dns_name: Some("abcde.12345.us-central1.sql.goog".into()),
            dns_names: Some(vec![DnsNameMapping {
                name: Some("abcde.12345.us-central1.sql.goog".into()),
                connection_type: Some("PRIVATE_SERVICE_CONNECT".into()),
                dns_scope: Some("INSTANCE".into()),
            }]),
            region: Some("us-east1".into()),
            psc_enabled: Some(true),
        };
        assert_eq!(got, want);
        Ok(())
    }

    #[test]
    fn connect_settings_nulls() -> anyhow::Result<()> {
        let input = json!({"ipAddresses": null, "dnsNames": null, "serverCaCert": {}});
        let got = serde_json::from_value::<ConnectSettings>(input)?;
        let want = ConnectSettings {
            server_ca_cert: Some(SslCertRecord::default()),
            ..Default::default()
        };
        assert_eq!(got, want);
        Ok(())
    }

    #[test]
    fn request_body() -> anyhow::Result<()> {
        let request = GenerateEphemeralCertRequest {
            public_key: "test-only-key".into(),
            access_token: None,
        };
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({"public_key": "test-only-key"})
        );

        let request = GenerateEphemeralCertRequest {
            access_token: Some("test-only-token".into()),
            ..request
        };
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({"public_key": "test-only-key", "access_token": "test-only-token"})
        );
        Ok(())
    }

    #[test]
    fn ephemeral_cert_response() -> anyhow::Result<()> {
        let got = serde_json::from_value::<GenerateEphemeralCertResponse>(
            json!({"ephemeralCert": {"cert": "test-only-cert"}}),
        )?;
        assert_eq!(
            got.ephemeral_cert.and_then(|c| c.cert).as_deref(),
            Some("test-only-cert")
        );
        Ok(())
    }
}
