//! Cluster configuration database (`/api/cluster_conf`)

use crate::client::{segment, status, Api, ApiRequest};
use crate::domain::value::deserialize_scalar_string;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Value of an option in one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionValue {
    pub section: String,
    #[serde(deserialize_with = "deserialize_scalar_string")]
    pub value: String,
}

/// A configuration option with its explicitly set per-section values
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    /// Absent when the option has never been set
    #[serde(default)]
    pub value: Vec<SectionValue>,
}

impl ConfigOption {
    /// Value set for `section`, if any
    pub fn section_value(&self, section: &str) -> Option<&str> {
        self.value
            .iter()
            .find(|v| v.section == section)
            .map(|v| v.value.as_str())
    }
}

#[derive(Serialize)]
struct SetRequest<'a> {
    name: &'a str,
    value: [SectionValue; 1],
}

impl Api<'_> {
    pub async fn list_cluster_config(&self) -> Result<Vec<ConfigOption>> {
        self.fetch(ApiRequest::get("cluster_conf", "unable to list cluster configuration"))
            .await
    }

    pub async fn get_cluster_config(&self, name: &str) -> Result<ConfigOption> {
        self.fetch(ApiRequest::get(
            format!("cluster_conf/{}", segment(name)),
            format!("unable to read cluster configuration {}", name),
        ))
        .await
    }

    pub async fn set_cluster_config(&self, section: &str, name: &str, value: &str) -> Result<()> {
        let req = ApiRequest::post(
            "cluster_conf",
            format!("unable to set cluster configuration {}/{}", section, name),
        )
        .json(&SetRequest {
            name,
            value: [SectionValue {
                section: section.to_string(),
                value: value.to_string(),
            }],
        })?
        .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn delete_cluster_config(&self, section: &str, name: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("cluster_conf/{}", segment(name)),
            format!("unable to delete cluster configuration {}/{}", section, name),
        )
        .query("section", section)
        .accept(status::ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }
}
