//! Manager module enablement (`ceph_mgr_module`)
//!
//! The module is enabled while the resource exists and disabled when it is
//! destroyed. Always-on modules cannot be disabled and are left running.

use crate::client::{Api, CephClient, MgrModuleInfo};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const KIND: &str = "ceph_mgr_module";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MgrModule {
    pub name: String,
    /// Reported by the Manager (computed)
    #[serde(default)]
    pub always_on: bool,
}

impl MgrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            always_on: false,
        }
    }
}

pub struct MgrModuleController {
    client: Arc<CephClient>,
}

impl MgrModuleController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    async fn find(&self, api: &Api<'_>, name: &str) -> Result<MgrModuleInfo> {
        api.list_mgr_modules()
            .await?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::NotFound {
                message: format!("manager module {} is not available", name),
            })
    }

    /// Authoritative state of an enabled module
    async fn enabled_state(&self, api: &Api<'_>, name: &str) -> Result<MgrModule> {
        let info = self.find(api, name).await?;
        if !info.enabled && !info.always_on {
            return Err(Error::NotFound {
                message: format!("manager module {} is disabled", name),
            });
        }
        Ok(MgrModule {
            name: info.name,
            always_on: info.always_on,
        })
    }
}

#[async_trait]
impl ResourceController for MgrModuleController {
    type Model = MgrModule;

    fn kind(&self) -> ResourceKind {
        ResourceKind::MgrModule
    }

    fn validate(&self, plan: &MgrModule) -> Result<()> {
        if plan.name.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("name"), "name must not be empty"));
        }
        Ok(())
    }

    fn replace_triggers(&self, prior: &MgrModule, plan: &MgrModule) -> Vec<&'static str> {
        if prior.name != plan.name {
            vec!["name"]
        } else {
            Vec::new()
        }
    }

    fn carry_computed(&self, prior: &MgrModule, plan: &mut MgrModule) {
        plan.always_on = prior.always_on;
    }

    async fn create(&self, ctx: &OpContext, plan: &MgrModule) -> Result<Applied<MgrModule>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        let info = self.find(&api, &plan.name).await?;
        if info.enabled || info.always_on {
            info!("Manager module {} is already enabled", plan.name);
        } else {
            info!("Enabling manager module {}", plan.name);
            api.enable_mgr_module(&plan.name).await?;
        }
        Ok(Applied::present(self.enabled_state(&api, &plan.name).await?))
    }

    async fn read(&self, ctx: &OpContext, state: &MgrModule) -> Result<Applied<MgrModule>> {
        let api = self.client.bind(ctx.cancel_token());
        let result = self.enabled_state(&api, &state.name).await.map(Applied::present);
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.name)
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &MgrModule,
        _plan: &MgrModule,
    ) -> Result<Applied<MgrModule>> {
        Err(Error::NotSupported {
            kind: KIND,
            operation: "update",
        })
    }

    async fn delete(&self, ctx: &OpContext, state: &MgrModule) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        let info = match self.find(&api, &state.name).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                diagnostics.warn(format!("manager module {} no longer exists", state.name), "");
                return Ok(diagnostics);
            }
            Err(e) => return Err(e),
        };
        if info.always_on {
            warn!("Manager module {} is always on and cannot be disabled", state.name);
            diagnostics.warn(
                format!("manager module {} is always on", state.name),
                "it was removed from state but keeps running",
            );
            return Ok(diagnostics);
        }
        if info.enabled {
            info!("Disabling manager module {}", state.name);
            api.disable_mgr_module(&state.name).await?;
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<MgrModule>> {
        let name = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());
        info!("Importing manager module {}", name);
        Ok(Applied::present(self.enabled_state(&api, name).await?))
    }
}
