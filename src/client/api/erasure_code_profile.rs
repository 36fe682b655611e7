//! Erasure-code profiles (`/api/erasure_code_profile`)
//!
//! The Manager uses the monitor's dashed key names for CRUSH placement
//! settings and reports `k`/`m` as strings on some releases.

use crate::client::api::de::{empty_as_none, flex_u32_opt};
use crate::client::{segment, status, Api, ApiRequest};
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErasureCodeProfileInfo {
    pub name: String,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub k: Option<u32>,
    #[serde(default, deserialize_with = "flex_u32_opt")]
    pub m: Option<u32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub plugin: Option<String>,
    #[serde(default, rename = "crush-failure-domain", deserialize_with = "empty_as_none")]
    pub crush_failure_domain: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub technique: Option<String>,
    #[serde(default, rename = "crush-root", deserialize_with = "empty_as_none")]
    pub crush_root: Option<String>,
    #[serde(default, rename = "crush-device-class", deserialize_with = "empty_as_none")]
    pub crush_device_class: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErasureCodeProfileRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(rename = "crush-failure-domain", skip_serializing_if = "Option::is_none")]
    pub crush_failure_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique: Option<String>,
    #[serde(rename = "crush-root", skip_serializing_if = "Option::is_none")]
    pub crush_root: Option<String>,
    #[serde(rename = "crush-device-class", skip_serializing_if = "Option::is_none")]
    pub crush_device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Api<'_> {
    pub async fn get_erasure_code_profile(&self, name: &str) -> Result<ErasureCodeProfileInfo> {
        self.fetch(ApiRequest::get(
            format!("erasure_code_profile/{}", segment(name)),
            format!("unable to read erasure code profile {}", name),
        ))
        .await
    }

    pub async fn create_erasure_code_profile(
        &self,
        request: &ErasureCodeProfileRequest,
    ) -> Result<()> {
        let req = ApiRequest::post(
            "erasure_code_profile",
            format!("unable to create erasure code profile {}", request.name),
        )
        .json(request)?
        .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn delete_erasure_code_profile(&self, name: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("erasure_code_profile/{}", segment(name)),
            format!("unable to delete erasure code profile {}", name),
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
    fn test_dashed_keys_and_string_counts() {
        let info: ErasureCodeProfileInfo = serde_json::from_value(json!({
            "name": "ec42",
            "k": "4",
            "m": 2,
            "plugin": "jerasure",
            "crush-failure-domain": "host",
            "crush-device-class": ""
        }))
        .unwrap();
        assert_eq!(info.k, Some(4));
        assert_eq!(info.m, Some(2));
        assert_eq!(info.crush_failure_domain.as_deref(), Some("host"));
        assert_eq!(info.crush_device_class, None);

        let request = ErasureCodeProfileRequest {
            name: "ec42".into(),
            k: Some("4".into()),
            crush_root: Some("default".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"name": "ec42", "k": "4", "crush-root": "default"})
        );
    }
}
