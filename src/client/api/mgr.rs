//! Manager modules (`/api/mgr/module`)

use crate::client::{segment, status, Api, ApiRequest};
use crate::client::api::de::flex_bool;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Module as listed by the Manager
#[derive(Debug, Clone, Deserialize)]
pub struct MgrModuleInfo {
    pub name: String,
    #[serde(default, deserialize_with = "flex_bool")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "flex_bool")]
    pub always_on: bool,
}

/// Published metadata of a module option
#[derive(Debug, Clone, Deserialize)]
pub struct MgrModuleOption {
    #[serde(default)]
    pub default_value: serde_json::Value,
    #[serde(default, rename = "type")]
    pub option_type: Option<String>,
}

#[derive(Serialize)]
struct SetConfigRequest<'a> {
    config: &'a BTreeMap<String, String>,
}

impl Api<'_> {
    pub async fn list_mgr_modules(&self) -> Result<Vec<MgrModuleInfo>> {
        self.fetch(ApiRequest::get("mgr/module", "unable to list manager modules"))
            .await
    }

    /// Current option values of a module
    pub async fn get_mgr_module_config(
        &self,
        module: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        self.fetch(ApiRequest::get(
            format!("mgr/module/{}", segment(module)),
            format!("unable to read configuration of manager module {}", module),
        ))
        .await
    }

    pub async fn set_mgr_module_config(
        &self,
        module: &str,
        config: &BTreeMap<String, String>,
    ) -> Result<()> {
        let req = ApiRequest::put(
            format!("mgr/module/{}", segment(module)),
            format!("unable to update configuration of manager module {}", module),
        )
        .json(&SetConfigRequest { config })?
        .accept(status::ANY_SUCCESS);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn get_mgr_module_options(
        &self,
        module: &str,
    ) -> Result<BTreeMap<String, MgrModuleOption>> {
        self.fetch(ApiRequest::get(
            format!("mgr/module/{}/options", segment(module)),
            format!("unable to read options of manager module {}", module),
        ))
        .await
    }

    pub async fn enable_mgr_module(&self, module: &str) -> Result<()> {
        let req = ApiRequest::post(
            format!("mgr/module/{}/enable", segment(module)),
            format!("unable to enable manager module {}", module),
        )
        .accept(status::ANY_SUCCESS);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn disable_mgr_module(&self, module: &str) -> Result<()> {
        let req = ApiRequest::post(
            format!("mgr/module/{}/disable", segment(module)),
            format!("unable to disable manager module {}", module),
        )
        .accept(status::ANY_SUCCESS);
        self.execute(req).await?;
        Ok(())
    }
}
