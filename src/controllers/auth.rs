//! Cephx identity controller (`ceph_auth`)
//!
//! Identities are created either from a capability list or, when the plan
//! carries a key, by importing a rendered keyring. After every mutation the
//! identity is re-exported so that `key` and `keyring` reflect what the
//! monitors actually hold.

use crate::client::{Api, CephClient};
use crate::domain::caps::Capabilities;
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::keyring::{self, KeyringEntry};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_auth";

// =============================================================================
// Model
// =============================================================================

/// A cephx identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthIdentity {
    /// Entity name such as `client.foo`; immutable
    pub entity: String,
    /// Capabilities keyed by `mds`, `mgr`, `mon` or `osd`
    #[serde(default)]
    pub caps: BTreeMap<String, String>,
    /// Cephx secret; generated by the cluster when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Keyring text as exported by the cluster (computed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyring: Option<String>,
}

impl AuthIdentity {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Default::default()
        }
    }

    pub fn with_cap(mut self, subsystem: &str, cap: &str) -> Self {
        self.caps.insert(subsystem.to_string(), cap.to_string());
        self
    }

    fn capabilities(&self) -> Result<Capabilities> {
        Capabilities::from_map(&self.caps).map_err(|e| e.at(AttrPath::attr("caps")))
    }
}

// =============================================================================
// Controller
// =============================================================================

pub struct AuthController {
    client: Arc<CephClient>,
}

impl AuthController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// Data-source lookup by entity name
    pub async fn lookup(&self, ctx: &OpContext, entity: &str) -> Result<AuthIdentity> {
        let api = self.client.bind(ctx.cancel_token());
        let (identity, _) = export_identity(&api, entity, None).await?;
        Ok(identity)
    }
}

/// Export `entity` and build its authoritative state
///
/// `requested` carries the caller's capability map; when it is equivalent to
/// what the server reports it is kept verbatim so that `Some("")` entries
/// do not show up as changes.
async fn export_identity(
    api: &Api<'_>,
    entity: &str,
    requested: Option<&BTreeMap<String, String>>,
) -> Result<(AuthIdentity, Diagnostics)> {
    let text = api.export_keyring(&[entity]).await?;
    let mut diagnostics = Diagnostics::new();

    if text.trim().is_empty() {
        return Err(Error::NotFound {
            message: format!("unable to export keyring for {}: no identities returned", entity),
        });
    }
    let mut entries = keyring::parse(&text)?;
    if entries.len() > 1 {
        warn!(
            "keyring export for {} returned {} identities, using the first",
            entity,
            entries.len()
        );
        diagnostics.warn(
            format!("keyring export for {} returned {} identities", entity, entries.len()),
            "only the first identity is kept in state",
        );
    }
    let KeyringEntry { entity: exported, key, caps } = entries.remove(0);

    let caps = match requested {
        Some(map) if Capabilities::from_map(map).is_ok_and(|c| c.equivalent(&caps)) => map.clone(),
        _ => caps.as_map(),
    };
    Ok((
        AuthIdentity {
            entity: exported,
            caps,
            key: Some(key),
            keyring: Some(text),
        },
        diagnostics,
    ))
}

#[async_trait]
impl ResourceController for AuthController {
    type Model = AuthIdentity;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Auth
    }

    fn validate(&self, plan: &AuthIdentity) -> Result<()> {
        if plan.entity.trim().is_empty() {
            return Err(Error::validation_at(
                AttrPath::attr("entity"),
                "entity must not be empty",
            ));
        }
        plan.capabilities()?;
        Ok(())
    }

    fn replace_triggers(&self, prior: &AuthIdentity, plan: &AuthIdentity) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.entity != plan.entity {
            triggers.push("entity");
        }
        if plan.key.is_some() && plan.key != prior.key {
            triggers.push("key");
        }
        triggers
    }

    fn carry_computed(&self, prior: &AuthIdentity, plan: &mut AuthIdentity) {
        if plan.key.is_none() {
            plan.key = prior.key.clone();
        }
        plan.keyring = prior.keyring.clone();
    }

    async fn create(&self, ctx: &OpContext, plan: &AuthIdentity) -> Result<Applied<AuthIdentity>> {
        self.validate(plan)?;
        let caps = plan.capabilities()?;
        let api = self.client.bind(ctx.cancel_token());

        match &plan.key {
            Some(key) => {
                info!("Importing ceph identity {} with a supplied key", plan.entity);
                let text = keyring::render(&[KeyringEntry::new(&plan.entity, key).with_caps(caps)]);
                api.import_user(&plan.entity, &text).await.map_err(|e| match e {
                    Error::Api { .. } => e.with_hint(
                        "the cluster rejected the keyring; an identity with the same entity \
                         but a different key or caps may already exist",
                    ),
                    other => other,
                })?;
            }
            None => {
                info!("Creating ceph identity {}", plan.entity);
                api.create_user(&plan.entity, &caps).await?;
            }
        }

        let (state, diagnostics) = export_identity(&api, &plan.entity, Some(&plan.caps)).await?;
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }

    async fn read(&self, ctx: &OpContext, state: &AuthIdentity) -> Result<Applied<AuthIdentity>> {
        let api = self.client.bind(ctx.cancel_token());

        let users = api.list_users().await?;
        if !users.iter().any(|u| u.entity == state.entity) {
            return drift::classify(
                DriftAction::RemoveResource,
                KIND,
                &state.entity,
                Error::NotFound {
                    message: format!("ceph identity {} not found", state.entity),
                },
            );
        }

        debug!("Refreshing ceph identity {}", state.entity);
        let result = export_identity(&api, &state.entity, Some(&state.caps))
            .await
            .map(|(s, d)| Applied::present(s).with_diagnostics(d));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.entity)
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &AuthIdentity,
        plan: &AuthIdentity,
    ) -> Result<Applied<AuthIdentity>> {
        self.validate(plan)?;
        if prior.entity != plan.entity {
            return Err(Error::validation_at(
                AttrPath::attr("entity"),
                "entity cannot be changed in place",
            ));
        }
        let caps = plan.capabilities()?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Updating capabilities of ceph identity {}", plan.entity);
        api.update_user(&plan.entity, &caps).await?;

        let (state, diagnostics) = export_identity(&api, &plan.entity, Some(&plan.caps)).await?;
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }

    async fn delete(&self, ctx: &OpContext, state: &AuthIdentity) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        info!("Deleting ceph identity {}", state.entity);
        api.delete_user(&state.entity).await?;
        Ok(Diagnostics::new())
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<AuthIdentity>> {
        let entity = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());
        info!("Importing ceph identity {}", entity);
        let (state, diagnostics) = export_identity(&api, entity, None).await?;
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }
}
