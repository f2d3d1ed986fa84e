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

use crate::error::{Error, ErrorCode};

/// Identifies a Cloud SQL instance.
///
/// The identifiers are used both to key the SQL Admin API requests and to
/// verify the server identity: the server certificate must have
/// `{project_id}:{instance_id}` as its subject common name.
///
/// # Example
/// ```
/// # use google_cloud_sql_connector::instance::InstanceConnectionInfo;
/// let info: InstanceConnectionInfo = "my-project:us-central1:my-instance".parse()?;
/// assert_eq!(info.project_id(), "my-project");
/// assert_eq!(info.region_id(), "us-central1");
/// assert_eq!(info.instance_id(), "my-instance");
/// assert_eq!(info.expected_common_name(), "my-project:my-instance");
/// # Ok::<(), google_cloud_sql_connector::error::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceConnectionInfo {
    project_id: String,
    region_id: String,
    instance_id: String,
}

impl InstanceConnectionInfo {
    /// Creates a new instance from its components.
    pub fn new<P, R, I>(project_id: P, region_id: R, instance_id: I) -> Self
    where
        P: Into<String>,
        R: Into<String>,
        I: Into<String>,
    {
        Self {
            project_id: project_id.into(),
            region_id: region_id.into(),
            instance_id: instance_id.into(),
        }
    }

    /// The project that contains the instance.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The region where the instance runs.
    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// The instance name within the project.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The subject common name the server certificate must present.
    pub fn expected_common_name(&self) -> String {
        format!("{}:{}", self.project_id, self.instance_id)
    }
}

impl std::str::FromStr for InstanceConnectionInfo {
    type Err = Error;

    /// Parses `project:region:instance`.
    ///
    /// Domain-scoped projects, such as `example.com:my-project`, keep their
    /// domain prefix in the project id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad_name = || {
            Error::connector(
                ErrorCode::BadConnectionName,
                format!(
                    "Malformed instance connection name provided: expected format \
                     of \"PROJECT:REGION:INSTANCE\", got {s}"
                ),
            )
        };
        let mut parts = s.rsplitn(3, ':');
        let instance_id = parts.next().ok_or_else(bad_name)?;
        let region_id = parts.next().ok_or_else(bad_name)?;
        let project_id = parts.next().ok_or_else(bad_name)?;
        let valid_project = match project_id.split_once(':') {
            None => !project_id.is_empty(),
            Some((domain, project)) => {
                !domain.is_empty() && !project.is_empty() && !project.contains(':')
            }
        };
        if !valid_project || region_id.is_empty() || instance_id.is_empty() {
            return Err(bad_name());
        }
        Ok(Self::new(project_id, region_id, instance_id))
    }
}

impl std::fmt::Display for InstanceConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.project_id, self.region_id, self.instance_id
        )
    }
}
