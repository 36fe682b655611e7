//! Erasure-code profile controller (`ceph_erasure_code_profile`)
//!
//! Profiles cannot be edited once pools reference them, so every changed
//! input replaces the profile. Inputs left unset take the monitor's defaults
//! and are recorded in state.

use crate::client::{CephClient, ErasureCodeProfileInfo, ErasureCodeProfileRequest};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const KIND: &str = "ceph_erasure_code_profile";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErasureCodeProfile {
    pub name: String,
    /// Data chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
    /// Coding chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crush_failure_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technique: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crush_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crush_device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl ErasureCodeProfile {
    pub fn new(name: impl Into<String>, k: u32, m: u32) -> Self {
        Self {
            name: name.into(),
            k: Some(k),
            m: Some(m),
            ..Default::default()
        }
    }

    fn request(&self) -> ErasureCodeProfileRequest {
        ErasureCodeProfileRequest {
            name: self.name.clone(),
            k: self.k.map(|k| k.to_string()),
            m: self.m.map(|m| m.to_string()),
            plugin: self.plugin.clone(),
            crush_failure_domain: self.crush_failure_domain.clone(),
            technique: self.technique.clone(),
            crush_root: self.crush_root.clone(),
            crush_device_class: self.crush_device_class.clone(),
            directory: self.directory.clone(),
        }
    }
}

impl From<ErasureCodeProfileInfo> for ErasureCodeProfile {
    fn from(info: ErasureCodeProfileInfo) -> Self {
        ErasureCodeProfile {
            name: info.name,
            k: info.k,
            m: info.m,
            plugin: info.plugin,
            crush_failure_domain: info.crush_failure_domain,
            technique: info.technique,
            crush_root: info.crush_root,
            crush_device_class: info.crush_device_class,
            directory: info.directory,
        }
    }
}

pub struct ErasureCodeProfileController {
    client: Arc<CephClient>,
}

impl ErasureCodeProfileController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceController for ErasureCodeProfileController {
    type Model = ErasureCodeProfile;

    fn kind(&self) -> ResourceKind {
        ResourceKind::ErasureCodeProfile
    }

    fn validate(&self, plan: &ErasureCodeProfile) -> Result<()> {
        if plan.name.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("name"), "name must not be empty"));
        }
        if plan.k == Some(0) {
            return Err(Error::validation_at(AttrPath::attr("k"), "k must be at least 1"));
        }
        if plan.m == Some(0) {
            return Err(Error::validation_at(AttrPath::attr("m"), "m must be at least 1"));
        }
        Ok(())
    }

    fn replace_triggers(
        &self,
        prior: &ErasureCodeProfile,
        plan: &ErasureCodeProfile,
    ) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.name != plan.name {
            triggers.push("name");
        }
        macro_rules! trigger {
            ($($field:ident),*) => {
                $(if plan.$field.is_some() && plan.$field != prior.$field {
                    triggers.push(stringify!($field));
                })*
            };
        }
        trigger!(
            k,
            m,
            plugin,
            crush_failure_domain,
            technique,
            crush_root,
            crush_device_class,
            directory
        );
        triggers
    }

    fn carry_computed(&self, prior: &ErasureCodeProfile, plan: &mut ErasureCodeProfile) {
        macro_rules! carry {
            ($($field:ident),*) => {
                $(if plan.$field.is_none() {
                    plan.$field = prior.$field.clone();
                })*
            };
        }
        carry!(
            k,
            m,
            plugin,
            crush_failure_domain,
            technique,
            crush_root,
            crush_device_class,
            directory
        );
    }

    async fn create(
        &self,
        ctx: &OpContext,
        plan: &ErasureCodeProfile,
    ) -> Result<Applied<ErasureCodeProfile>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Creating erasure code profile {}", plan.name);
        api.create_erasure_code_profile(&plan.request()).await?;

        let info = api.get_erasure_code_profile(&plan.name).await?;
        Ok(Applied::present(info.into()))
    }

    async fn read(
        &self,
        ctx: &OpContext,
        state: &ErasureCodeProfile,
    ) -> Result<Applied<ErasureCodeProfile>> {
        let api = self.client.bind(ctx.cancel_token());
        debug!("Refreshing erasure code profile {}", state.name);
        let result = api
            .get_erasure_code_profile(&state.name)
            .await
            .map(|info| Applied::present(info.into()));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.name)
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &ErasureCodeProfile,
        _plan: &ErasureCodeProfile,
    ) -> Result<Applied<ErasureCodeProfile>> {
        Err(Error::NotSupported {
            kind: KIND,
            operation: "update",
        })
    }

    async fn delete(&self, ctx: &OpContext, state: &ErasureCodeProfile) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());

        info!("Deleting erasure code profile {}", state.name);
        api.delete_erasure_code_profile(&state.name)
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    e
                } else {
                    e.with_hint(format!(
                        "erasure code profile {} may still be used by a pool or crush rule",
                        state.name
                    ))
                }
            })?;
        Ok(Diagnostics::new())
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<ErasureCodeProfile>> {
        let name = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());
        info!("Importing erasure code profile {}", name);
        Ok(Applied::present(api.get_erasure_code_profile(name).await?.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use assert_matches::assert_matches;
    use httptest::matchers::{all_of, eq, json_decoded, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    fn ec42() -> serde_json::Value {
        json!({
            "name": "ec42",
            "k": "4",
            "m": "2",
            "plugin": "jerasure",
            "technique": "reed_sol_van",
            "crush-failure-domain": "host",
            "crush-root": "default",
            "crush-device-class": "",
            "directory": "/usr/lib/ceph/erasure-code"
        })
    }

    #[tokio::test]
    async fn test_create_records_defaults() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/erasure_code_profile"),
                request::body(json_decoded(eq(json!({
                    "name": "ec42",
                    "k": "4",
                    "m": "2",
                    "crush-failure-domain": "host"
                })))),
            ])
            .respond_with(status_code(201)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/erasure_code_profile/ec42"))
                .respond_with(json_encoded(ec42())),
        );

        let controller = ErasureCodeProfileController::new(client_for(&server));
        let mut plan = ErasureCodeProfile::new("ec42", 4, 2);
        plan.crush_failure_domain = Some("host".into());

        let state = controller
            .create(&OpContext::default(), &plan)
            .await
            .unwrap()
            .state
            .unwrap();
        assert_eq!(state.plugin.as_deref(), Some("jerasure"));
        assert_eq!(state.crush_device_class, None);

        let mut next = plan.clone();
        controller.carry_computed(&state, &mut next);
        assert_eq!(next, state);
        assert!(controller.replace_triggers(&state, &next).is_empty());
    }

    #[test]
    fn test_changed_input_forces_replacement() {
        let controller = ErasureCodeProfileController::new(offline_client());
        let prior = ErasureCodeProfile::new("ec42", 4, 2);
        let mut plan = ErasureCodeProfile::new("ec42", 4, 3);
        plan.plugin = Some("isa".into());
        assert_eq!(controller.replace_triggers(&prior, &plan), vec!["m", "plugin"]);
    }

    #[tokio::test]
    async fn test_update_not_supported() {
        let controller = ErasureCodeProfileController::new(offline_client());
        let profile = ErasureCodeProfile::new("ec42", 4, 2);
        let err = controller
            .update(&OpContext::default(), &profile, &profile)
            .await
            .unwrap_err();
        assert_matches!(err, Error::NotSupported { .. });
    }

    #[tokio::test]
    async fn test_delete_in_use_carries_hint() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/erasure_code_profile/ec42"))
                .respond_with(json_status(400, json!({"detail": "profile is in use"}))),
        );

        let controller = ErasureCodeProfileController::new(client_for(&server));
        let err = controller
            .delete(&OpContext::default(), &ErasureCodeProfile::new("ec42", 4, 2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("may still be used"));
    }

    #[tokio::test]
    async fn test_missing_profile_is_drift() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/erasure_code_profile/ec42"))
                .respond_with(status_code(404)),
        );

        let controller = ErasureCodeProfileController::new(client_for(&server));
        let applied = controller
            .read(&OpContext::default(), &ErasureCodeProfile::new("ec42", 4, 2))
            .await
            .unwrap();
        assert!(applied.is_removed());
    }

    #[test]
    fn test_zero_chunks_rejected() {
        let controller = ErasureCodeProfileController::new(offline_client());
        assert!(controller.validate(&ErasureCodeProfile::new("ec", 0, 2)).is_err());
        assert!(controller.validate(&ErasureCodeProfile::new("ec", 2, 0)).is_err());
    }
}
