//! Pools (`/api/pool`)

use crate::client::api::de::{empty_as_none, flex_u32_opt, flex_u64_opt};
use crate::client::{segment, status, Api, ApiRequest};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pool as returned by the Manager
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolInfo {
    pub pool_name: String,
    /// Numeric pool id
    #[serde(default, rename = "pool", deserialize_with = "flex_u64_opt")]
    pub pool_id: Option<u64>,
    #[serde(default, rename = "type")]
    pub pool_type: String,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub size: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub min_size: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub pg_num: Option<u32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub pg_autoscale_mode: Option<String>,
    /// Rule name; the Manager resolves the numeric rule id for us
    #[serde(default, deserialize_with = "empty_as_none")]
    pub crush_rule: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub erasure_code_profile: Option<String>,
    #[serde(default, deserialize_with = "flex_u64_opt")]
    pub quota_max_bytes: Option<u64>,
    #[serde(default, deserialize_with = "flex_u64_opt")]
    pub quota_max_objects: Option<u64>,
    #[serde(default)]
    pub application_metadata: Vec<String>,
    /// Per-pool overrides such as the compression settings
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Fields of a pool create/update request
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolRequest {
    /// New name on update, the name on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_num: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_autoscale_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erasure_code_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_required_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_min_blob_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_max_blob_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_max_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_max_objects: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_metadata: Option<Vec<String>>,
}

impl PoolRequest {
    /// True when the request would not change anything
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_object().map(|o| o.is_empty()))
            .unwrap_or(false)
    }
}

impl Api<'_> {
    pub async fn create_pool(&self, request: &PoolRequest) -> Result<()> {
        let name = request.pool.as_deref().unwrap_or_default();
        let req = ApiRequest::post("pool", format!("unable to create pool {}", name))
            .json(request)?
            .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn get_pool(&self, name: &str) -> Result<PoolInfo> {
        self.fetch(ApiRequest::get(
            format!("pool/{}", segment(name)),
            format!("unable to read pool {}", name),
        ))
        .await
    }

    pub async fn update_pool(&self, name: &str, request: &PoolRequest) -> Result<()> {
        let req = ApiRequest::put(
            format!("pool/{}", segment(name)),
            format!("unable to update pool {}", name),
        )
        .json(request)?
        .accept(status::OK_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn delete_pool(&self, name: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("pool/{}", segment(name)),
            format!("unable to delete pool {}", name),
        )
        .accept(status::ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pool_info_decodes_manager_shape() {
        let info: PoolInfo = serde_json::from_value(json!({
            "pool_name": "rbd",
            "pool": 3,
            "type": "replicated",
            "size": 3,
            "min_size": 2,
            "pg_num": 32,
            "pg_autoscale_mode": "on",
            "crush_rule": "replicated_rule",
            "erasure_code_profile": "",
            "quota_max_bytes": 0,
            "application_metadata": ["rbd"],
            "options": {"compression_mode": "aggressive"}
        }))
        .unwrap();

        assert_eq!(info.pool_id, Some(3));
        assert_eq!(info.pool_type, "replicated");
        assert_eq!(info.erasure_code_profile, None);
        assert_eq!(info.options["compression_mode"], json!("aggressive"));
    }

    #[test]
    fn test_empty_request() {
        assert!(PoolRequest::default().is_empty());
        let request = PoolRequest {
            min_size: Some(2),
            ..Default::default()
        };
        assert!(!request.is_empty());
    }
}
