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

//! Derives connector values from the `ConnectSettings` response.
//!
//! Newer versions of the SQL Admin API return a list of typed DNS names,
//! older versions return a single `dnsName` field. Each derived value is
//! defined by an ordered list of rules, the first rule that applies and
//! produces a value wins.

use super::model::{ConnectSettings, DnsNameMapping};
use crate::ip_addresses::IpAddresses;

const PRIMARY: &str = "PRIMARY";
const PRIVATE: &str = "PRIVATE";
const PRIVATE_SERVICE_CONNECT: &str = "PRIVATE_SERVICE_CONNECT";
const INSTANCE_SCOPE: &str = "INSTANCE";

#[derive(Debug)]
pub(crate) struct Rule {
    pub name: &'static str,
    pub applies: fn(&ConnectSettings) -> bool,
    pub extract: fn(&ConnectSettings) -> Option<String>,
}

/// Returns the value of the first rule that applies and extracts a value.
pub(crate) fn evaluate(rules: &[Rule], settings: &ConnectSettings) -> Option<String> {
    rules
        .iter()
        .filter(|rule| (rule.applies)(settings))
        .find_map(|rule| {
            let value = (rule.extract)(settings);
            if value.is_some() {
                tracing::debug!(rule = rule.name, "derived value from connect settings");
            }
            value
        })
}

/// The rules to find the Private Service Connect DNS name.
///
/// `dnsName` is also set for instances using the CAS server CA mode, so the
/// legacy field is only used when PSC is enabled.
pub(crate) const PSC_NAME_RULES: &[Rule] = &[
    Rule {
        name: "instance-scoped PSC DNS name",
        applies: |s| instance_psc_name(s).is_some(),
        extract: |s| instance_psc_name(s).map(str::to_string),
    },
    Rule {
        name: "legacy DNS name with PSC enabled",
        applies: |s| s.psc_enabled == Some(true),
        extract: legacy_dns_name,
    },
];

/// The rules to find the name used to validate the server certificate.
///
/// Any name in the `dnsNames` list may be used, the connector uses the first.
pub(crate) const SERVER_NAME_RULES: &[Rule] = &[
    Rule {
        name: "first DNS name",
        applies: |s| s.dns_names.as_ref().is_some_and(|v| !v.is_empty()),
        extract: |s| {
            s.dns_names
                .as_ref()
                .and_then(|v| v.first())
                .and_then(|m| non_empty(m.name.as_deref()))
        },
    },
    Rule {
        name: "legacy DNS name",
        applies: |s| s.dns_name.is_some(),
        extract: legacy_dns_name,
    },
];

/// Derives the instance addresses.
///
/// The `PRIMARY` address is the public address and the `PRIVATE` address is
/// the private address. Other types, such as `OUTGOING`, are ignored.
pub(crate) fn ip_addresses(settings: &ConnectSettings) -> IpAddresses {
    let mappings = settings.ip_addresses.as_deref().unwrap_or_default();
    let address_for = |kind: &str| {
        mappings
            .iter()
            .filter(|m| m.kind.as_deref() == Some(kind))
            .filter_map(|m| non_empty(m.ip_address.as_deref()))
            .last()
    };
    IpAddresses {
        public: address_for(PRIMARY),
        private: address_for(PRIVATE),
        psc: evaluate(PSC_NAME_RULES, settings),
    }
}

/// Derives the server name, or an empty string if there is none.
pub(crate) fn server_name(settings: &ConnectSettings) -> String {
    evaluate(SERVER_NAME_RULES, settings).unwrap_or_default()
}

fn instance_psc_name(settings: &ConnectSettings) -> Option<&str> {
    settings
        .dns_names
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|m| is_instance_psc(m))
        .and_then(|m| m.name.as_deref())
}

fn is_instance_psc(mapping: &DnsNameMapping) -> bool {
    mapping.name.as_deref().is_some_and(|n| !n.is_empty())
        && mapping.connection_type.as_deref() == Some(PRIVATE_SERVICE_CONNECT)
        && mapping.dns_scope.as_deref() == Some(INSTANCE_SCOPE)
}

fn legacy_dns_name(settings: &ConnectSettings) -> Option<String> {
    non_empty(settings.dns_name.as_deref())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqladmin::model::IpMapping;

    fn dns(name: &str, connection_type: &str, scope: &str) -> DnsNameMapping {
        DnsNameMapping {
            name: Some(name.into()),
            connection_type: Some(connection_type.into()),
            dns_scope: Some(scope.into()),
        }
    }

    fn ip(kind: &str, address: &str) -> IpMapping {
        IpMapping {
            kind: Some(kind.into()),
            ip_address: Some(address.into()),
        }
    }

    #[test]
    fn public_and_private() {
        let settings = ConnectSettings {
            ip_addresses: Some(vec![
                ip("PRIMARY", "0.0.0.0"),
                ip("OUTGOING", "0.0.0.1"),
                ip("PRIVATE", "0.0.0.2"),
            ]),
            ..Default::default()
        };
        let got = ip_addresses(&settings);
        assert_eq!(
            got,
            IpAddresses {
                public: Some("0.0.0.0".into()),
                private: Some("0.0.0.2".into()),
                psc: None,
            }
        );
    }

    #[test]
    fn ignores_unsupported_and_empty() {
        let settings = ConnectSettings {
            ip_addresses: Some(vec![
                ip("OUTGOING", "0.0.0.1"),
                ip("PRIMARY", ""),
                IpMapping {
                    kind: None,
                    ip_address: Some("0.0.0.3".into()),
                },
            ]),
            ..Default::default()
        };
        assert!(ip_addresses(&settings).is_empty());
    }

    #[test]
    fn psc_typed_name_preferred() {
        let settings = ConnectSettings {
            dns_name: Some("legacy.sql.goog".into()),
            dns_names: Some(vec![
                dns("global.sql.goog", "PRIVATE_SERVICE_CONNECT", "GLOBAL"),
                dns("cas.sql.goog", "PRIVATE_SERVICE_ACCESS", "INSTANCE"),
                dns("psc.sql.goog", "PRIVATE_SERVICE_CONNECT", "INSTANCE"),
            ]),
            psc_enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(
            evaluate(PSC_NAME_RULES, &settings).as_deref(),
            Some("psc.sql.goog")
        );
    }

    #[test]
    fn psc_legacy_name_requires_psc_enabled() {
        let mut settings = ConnectSettings {
            dns_name: Some("legacy.sql.goog".into()),
            dns_names: Some(vec![dns(
                "cas.sql.goog",
                "PRIVATE_SERVICE_ACCESS",
                "INSTANCE",
            )]),
            ..Default::default()
        };
        assert_eq!(evaluate(PSC_NAME_RULES, &settings), None);

        settings.psc_enabled = Some(false);
        assert_eq!(evaluate(PSC_NAME_RULES, &settings), None);

        settings.psc_enabled = Some(true);
        assert_eq!(
            evaluate(PSC_NAME_RULES, &settings).as_deref(),
            Some("legacy.sql.goog")
        );
    }

    #[test]
    fn psc_none() {
        let settings = ConnectSettings {
            psc_enabled: Some(true),
            dns_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(evaluate(PSC_NAME_RULES, &settings), None);
    }

    #[test]
    fn server_name_first_dns_name() {
        let settings = ConnectSettings {
            dns_name: Some("legacy.sql.goog".into()),
            dns_names: Some(vec![
                dns("first.sql.goog", "PRIVATE_SERVICE_ACCESS", "INSTANCE"),
                dns("second.sql.goog", "PRIVATE_SERVICE_CONNECT", "INSTANCE"),
            ]),
            ..Default::default()
        };
        assert_eq!(server_name(&settings), "first.sql.goog");
    }

    #[test]
    fn server_name_legacy() {
        let settings = ConnectSettings {
            dns_name: Some("legacy.sql.goog".into()),
            dns_names: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(server_name(&settings), "legacy.sql.goog");

        let settings = ConnectSettings {
            dns_name: Some("legacy.sql.goog".into()),
            dns_names: Some(vec![DnsNameMapping::default()]),
            ..Default::default()
        };
        assert_eq!(server_name(&settings), "legacy.sql.goog");
    }

    #[test]
    fn server_name_empty() {
        assert_eq!(server_name(&ConnectSettings::default()), "");
    }

    #[test]
    fn rule_order() {
        let names = PSC_NAME_RULES.iter().map(|r| r.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["instance-scoped PSC DNS name", "legacy DNS name with PSC enabled"]
        );
        let names = SERVER_NAME_RULES.iter().map(|r| r.name).collect::<Vec<_>>();
        assert_eq!(names, ["first DNS name", "legacy DNS name"]);
    }
}
