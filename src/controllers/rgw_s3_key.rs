//! RADOS Gateway S3 key controller (`ceph_rgw_s3_key`)
//!
//! A key belongs to a user or, when `user` is written `parent:subuser`, to a
//! subuser. The access key identifies the key; there is no in-place update.

use crate::client::{Api, CephClient, RgwKey, S3KeyRequest};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_rgw_s3_key";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RgwS3Key {
    /// Owning uid, `parent:subuser` for a subuser key
    pub user: String,
    /// Generated by the gateway when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// Generated by the gateway when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl RgwS3Key {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    fn from_key(key: RgwKey) -> Self {
        RgwS3Key {
            user: key.user,
            access_key: Some(key.access_key),
            secret_key: Some(key.secret_key),
            active: Some(key.active),
        }
    }
}

pub struct RgwS3KeyController {
    client: Arc<CephClient>,
}

impl RgwS3KeyController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// S3 keys owned by exactly `user`
    async fn keys_of(&self, api: &Api<'_>, user: &str) -> Result<Vec<RgwKey>> {
        let (parent, _) = import::split_subuser(user);
        let info = api.get_rgw_user(parent).await?;
        Ok(info.keys.into_iter().filter(|k| k.user == user).collect())
    }

    /// Data-source lookup
    ///
    /// With `access_key` the key must exist. Without it the user must own
    /// exactly one S3 key.
    pub async fn lookup(
        &self,
        ctx: &OpContext,
        user: &str,
        access_key: Option<&str>,
    ) -> Result<RgwS3Key> {
        let api = self.client.bind(ctx.cancel_token());
        let mut keys = self.keys_of(&api, user).await?;

        match access_key {
            Some(access_key) => keys
                .into_iter()
                .find(|k| k.access_key == access_key)
                .map(RgwS3Key::from_key)
                .ok_or_else(|| Error::NotFound {
                    message: format!("s3 key {} not found for rgw user {}", access_key, user),
                }),
            None => match keys.len() {
                0 => Err(Error::NotFound {
                    message: format!("no s3 keys found for rgw user {}", user),
                }),
                1 => Ok(RgwS3Key::from_key(keys.remove(0))),
                n => Err(Error::validation_at(
                    AttrPath::attr("access_key"),
                    format!(
                        "multiple keys found for rgw user {} ({}); the lookup is ambiguous, set access_key",
                        user, n
                    ),
                )),
            },
        }
    }

    fn validate_pair(plan: &RgwS3Key) -> Result<()> {
        match (&plan.access_key, &plan.secret_key) {
            (Some(_), None) => Err(Error::validation_at(
                AttrPath::attr("secret_key"),
                "secret_key is required when access_key is set",
            )),
            (None, Some(_)) => Err(Error::validation_at(
                AttrPath::attr("access_key"),
                "access_key is required when secret_key is set",
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceController for RgwS3KeyController {
    type Model = RgwS3Key;

    fn kind(&self) -> ResourceKind {
        ResourceKind::RgwS3Key
    }

    fn validate(&self, plan: &RgwS3Key) -> Result<()> {
        if plan.user.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("user"), "user must not be empty"));
        }
        Self::validate_pair(plan)
    }

    fn replace_triggers(&self, prior: &RgwS3Key, plan: &RgwS3Key) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.user != plan.user {
            triggers.push("user");
        }
        if plan.access_key.is_some() && plan.access_key != prior.access_key {
            triggers.push("access_key");
        }
        if plan.secret_key.is_some() && plan.secret_key != prior.secret_key {
            triggers.push("secret_key");
        }
        triggers
    }

    fn carry_computed(&self, prior: &RgwS3Key, plan: &mut RgwS3Key) {
        if plan.access_key.is_none() {
            plan.access_key = prior.access_key.clone();
        }
        if plan.secret_key.is_none() {
            plan.secret_key = prior.secret_key.clone();
        }
        plan.active = prior.active;
    }

    async fn create(&self, ctx: &OpContext, plan: &RgwS3Key) -> Result<Applied<RgwS3Key>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());
        let (parent, subuser) = import::split_subuser(&plan.user);
        let mut diagnostics = Diagnostics::new();

        // keys present before the call, to spot the generated one
        let existing: BTreeSet<String> = match &plan.access_key {
            Some(_) => BTreeSet::new(),
            None => self
                .keys_of(&api, &plan.user)
                .await?
                .into_iter()
                .map(|k| k.access_key)
                .collect(),
        };

        let request = S3KeyRequest {
            uid: parent.to_string(),
            key_type: "s3",
            subuser: subuser.map(|_| plan.user.clone()),
            access_key: plan.access_key.clone(),
            secret_key: plan.secret_key.clone(),
            generate_key: Some(plan.access_key.is_none()),
        };
        info!(
            "Creating s3 key for rgw user {} ({})",
            plan.user,
            if plan.access_key.is_some() { "custom" } else { "generated" }
        );
        let keys = api.create_s3_key(parent, &request).await?;

        let mut candidates: Vec<RgwKey> = keys
            .into_iter()
            .filter(|k| k.user == plan.user)
            .filter(|k| match &plan.access_key {
                Some(access_key) => &k.access_key == access_key,
                None => !existing.contains(&k.access_key),
            })
            .collect();
        if candidates.is_empty() {
            return Err(Error::Internal(format!(
                "unable to create s3 key for rgw user {}: the created key is missing from the response",
                plan.user
            )));
        }
        if candidates.len() > 1 {
            warn!(
                "s3 key creation for {} returned {} new keys, keeping the first",
                plan.user,
                candidates.len()
            );
            diagnostics.warn(
                format!("s3 key creation for {} returned {} new keys", plan.user, candidates.len()),
                "only the first is kept in state",
            );
        }
        let state = RgwS3Key::from_key(candidates.remove(0));
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }

    async fn read(&self, ctx: &OpContext, state: &RgwS3Key) -> Result<Applied<RgwS3Key>> {
        let api = self.client.bind(ctx.cancel_token());
        let Some(access_key) = state.access_key.as_deref() else {
            return Err(Error::Internal(format!(
                "s3 key of rgw user {} has no access key in state",
                state.user
            )));
        };

        debug!("Refreshing s3 key {} of rgw user {}", access_key, state.user);
        let result = self.keys_of(&api, &state.user).await.and_then(|keys| {
            keys.into_iter()
                .find(|k| k.access_key == access_key)
                .map(|k| Applied::present(RgwS3Key::from_key(k)))
                .ok_or_else(|| Error::NotFound {
                    message: format!("s3 key {} not found for rgw user {}", access_key, state.user),
                })
        });
        drift::on_missing(result, DriftAction::RemoveResource, KIND, access_key)
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &RgwS3Key,
        _plan: &RgwS3Key,
    ) -> Result<Applied<RgwS3Key>> {
        Err(Error::NotSupported {
            kind: KIND,
            operation: "update",
        })
    }

    async fn delete(&self, ctx: &OpContext, state: &RgwS3Key) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();
        let Some(access_key) = state.access_key.as_deref() else {
            diagnostics.warn(format!("s3 key of rgw user {} has no access key", state.user), "");
            return Ok(diagnostics);
        };
        let (parent, subuser) = import::split_subuser(&state.user);

        info!("Deleting s3 key {} of rgw user {}", access_key, state.user);
        let subuser = subuser.map(|_| state.user.as_str());
        match api.delete_s3_key(parent, access_key, subuser).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("s3 key {} was already deleted", access_key);
                diagnostics.warn(format!("s3 key {} was already deleted", access_key), "");
            }
            Err(e) => return Err(e),
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<RgwS3Key>> {
        let (user, access_key) = import::parse_s3_key_id(id)?;
        info!("Importing s3 key {} of rgw user {}", access_key, user);
        Ok(Applied::present(self.lookup(ctx, user, Some(access_key)).await?))
    }
}
