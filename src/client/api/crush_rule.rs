//! CRUSH rules (`/api/crush_rule`)
//!
//! Reads negotiate the v2.0 media type; older versions omit the rule steps.

use crate::client::api::de::flex_u32_opt;
use crate::client::{segment, status, Api, ApiRequest, ApiVersion};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Rule as returned by the v2.0 read endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrushRuleInfo {
    pub rule_name: String,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub rule_id: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub ruleset: Option<u32>,
    #[serde(default, rename = "type", deserialize_with = "flex_u32_opt")]
    pub rule_type: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub min_size: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrushRuleRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl Api<'_> {
    pub async fn list_crush_rules(&self) -> Result<Vec<CrushRuleInfo>> {
        self.fetch(
            ApiRequest::get("crush_rule", "unable to list crush rules").version(ApiVersion::V2_0),
        )
        .await
    }

    pub async fn get_crush_rule(&self, name: &str) -> Result<CrushRuleInfo> {
        self.fetch(
            ApiRequest::get(
                format!("crush_rule/{}", segment(name)),
                format!("unable to read crush rule {}", name),
            )
            .version(ApiVersion::V2_0),
        )
        .await
    }

    pub async fn create_crush_rule(&self, request: &CrushRuleRequest) -> Result<()> {
        let req = ApiRequest::post(
            "crush_rule",
            format!("unable to create crush rule {}", request.name),
        )
        .json(request)?
        .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn delete_crush_rule(&self, name: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("crush_rule/{}", segment(name)),
            format!("unable to delete crush rule {}", name),
        )
        .accept(status::ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }
}
