//! RADOS Gateway user controller (`ceph_rgw_user`)

use crate::client::{CephClient, RgwUserInfo, RgwUserRequest};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_rgw_user";

/// A gateway user
///
/// Optional attributes left unset in a plan are filled from the gateway and
/// kept as-is on later applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RgwUser {
    /// User id; immutable
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    /// Tenant the user belongs to (computed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Admin flag (computed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
}

impl RgwUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    fn request(&self) -> RgwUserRequest {
        RgwUserRequest {
            uid: None,
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            max_buckets: self.max_buckets,
            system: self.system,
            suspended: self.suspended.map(u8::from),
            generate_key: None,
        }
    }
}

impl From<RgwUserInfo> for RgwUser {
    fn from(info: RgwUserInfo) -> Self {
        RgwUser {
            uid: info.id().to_string(),
            display_name: info.display_name,
            email: info.email,
            max_buckets: info.max_buckets,
            system: Some(info.system),
            suspended: Some(info.suspended),
            tenant: info.tenant,
            admin: Some(info.admin),
        }
    }
}

pub struct RgwUserController {
    client: Arc<CephClient>,
}

impl RgwUserController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// Data-source lookup by uid
    pub async fn lookup(&self, ctx: &OpContext, uid: &str) -> Result<RgwUser> {
        let api = self.client.bind(ctx.cancel_token());
        Ok(api.get_rgw_user(uid).await?.into())
    }
}

#[async_trait]
impl ResourceController for RgwUserController {
    type Model = RgwUser;

    fn kind(&self) -> ResourceKind {
        ResourceKind::RgwUser
    }

    fn validate(&self, plan: &RgwUser) -> Result<()> {
        if plan.uid.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("uid"), "uid must not be empty"));
        }
        if plan.max_buckets.is_some_and(|m| m < -1) {
            return Err(Error::validation_at(
                AttrPath::attr("max_buckets"),
                "max_buckets must be -1 (disabled), 0 (unlimited) or positive",
            ));
        }
        Ok(())
    }

    fn replace_triggers(&self, prior: &RgwUser, plan: &RgwUser) -> Vec<&'static str> {
        if prior.uid != plan.uid {
            vec!["uid"]
        } else {
            Vec::new()
        }
    }

    fn carry_computed(&self, prior: &RgwUser, plan: &mut RgwUser) {
        macro_rules! carry {
            ($($field:ident),*) => {
                $(if plan.$field.is_none() {
                    plan.$field = prior.$field.clone();
                })*
            };
        }
        carry!(display_name, email, max_buckets, system, suspended);
        plan.tenant = prior.tenant.clone();
        plan.admin = prior.admin;
    }

    async fn create(&self, ctx: &OpContext, plan: &RgwUser) -> Result<Applied<RgwUser>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        let mut request = plan.request();
        request.uid = Some(plan.uid.clone());
        request.generate_key = Some(false);

        info!("Creating rgw user {}", plan.uid);
        let info = api.create_rgw_user(&request).await?;
        Ok(Applied::present(info.into()))
    }

    async fn read(&self, ctx: &OpContext, state: &RgwUser) -> Result<Applied<RgwUser>> {
        let api = self.client.bind(ctx.cancel_token());
        debug!("Refreshing rgw user {}", state.uid);
        let result = api
            .get_rgw_user(&state.uid)
            .await
            .map(|info| Applied::present(info.into()));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.uid)
    }

    async fn update(&self, ctx: &OpContext, prior: &RgwUser, plan: &RgwUser) -> Result<Applied<RgwUser>> {
        self.validate(plan)?;
        if prior.uid != plan.uid {
            return Err(Error::validation_at(AttrPath::attr("uid"), "uid cannot be changed in place"));
        }
        let api = self.client.bind(ctx.cancel_token());

        info!("Updating rgw user {}", plan.uid);
        let info = match api.update_rgw_user(&plan.uid, &plan.request()).await? {
            Some(info) => info,
            None => api.get_rgw_user(&plan.uid).await?,
        };
        Ok(Applied::present(info.into()))
    }

    async fn delete(&self, ctx: &OpContext, state: &RgwUser) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        info!("Deleting rgw user {}", state.uid);
        match api.delete_rgw_user(&state.uid).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("rgw user {} was already deleted", state.uid);
                diagnostics.warn(format!("rgw user {} was already deleted", state.uid), "");
            }
            Err(e) => return Err(e),
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<RgwUser>> {
        let uid = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Importing rgw user {}", uid);
        match api.get_rgw_user(uid).await {
            Ok(info) => Ok(Applied::present(info.into())),
            Err(e) if e.is_not_found() => Err(Error::NotFound {
                message: format!("unable to read rgw user during import: {}: {}", uid, e),
            }),
            Err(e) => Err(e),
        }
    }
}
