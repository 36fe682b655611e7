//! RADOS Gateway bucket controller (`ceph_rgw_bucket`)
//!
//! Buckets are replace-only. The zonegroup is computed when the plan leaves
//! it unset.

use crate::client::{BucketCreateRequest, CephClient, RgwBucketInfo};
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

const KIND: &str = "ceph_rgw_bucket";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RgwBucket {
    pub bucket: String,
    /// Owning gateway user
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zonegroup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<String>,
}

impl RgwBucket {
    pub fn new(bucket: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            owner: owner.into(),
            ..Default::default()
        }
    }
}

impl From<RgwBucketInfo> for RgwBucket {
    fn from(info: RgwBucketInfo) -> Self {
        RgwBucket {
            bucket: info.bucket,
            owner: info.owner,
            zonegroup: info.zonegroup,
            placement_rule: info.placement_rule,
            id: info.id,
            creation_time: info.creation_time,
            acl: info.acl,
            bid: info.bid,
        }
    }
}

pub struct RgwBucketController {
    client: Arc<CephClient>,
}

impl RgwBucketController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceController for RgwBucketController {
    type Model = RgwBucket;

    fn kind(&self) -> ResourceKind {
        ResourceKind::RgwBucket
    }

    fn validate(&self, plan: &RgwBucket) -> Result<()> {
        if plan.bucket.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("bucket"), "bucket must not be empty"));
        }
        if plan.owner.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("owner"), "owner must not be empty"));
        }
        Ok(())
    }

    fn replace_triggers(&self, prior: &RgwBucket, plan: &RgwBucket) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.bucket != plan.bucket {
            triggers.push("bucket");
        }
        if prior.owner != plan.owner {
            triggers.push("owner");
        }
        if plan.zonegroup.is_some() && plan.zonegroup != prior.zonegroup {
            triggers.push("zonegroup");
        }
        if plan.placement_rule.is_some() && plan.placement_rule != prior.placement_rule {
            triggers.push("placement_rule");
        }
        triggers
    }

    fn carry_computed(&self, prior: &RgwBucket, plan: &mut RgwBucket) {
        if plan.zonegroup.is_none() {
            plan.zonegroup = prior.zonegroup.clone();
        }
        if plan.placement_rule.is_none() {
            plan.placement_rule = prior.placement_rule.clone();
        }
        plan.id = prior.id.clone();
        plan.creation_time = prior.creation_time.clone();
        plan.acl = prior.acl.clone();
        plan.bid = prior.bid.clone();
    }

    async fn create(&self, ctx: &OpContext, plan: &RgwBucket) -> Result<Applied<RgwBucket>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        let request = BucketCreateRequest {
            bucket: plan.bucket.clone(),
            uid: plan.owner.clone(),
            zonegroup: plan.zonegroup.clone(),
            placement_target: plan.placement_rule.clone(),
        };
        info!("Creating rgw bucket {} owned by {}", plan.bucket, plan.owner);
        api.create_rgw_bucket(&request).await?;

        let state: RgwBucket = api.get_rgw_bucket(&plan.bucket).await?.into();
        Ok(Applied::present(state))
    }

    async fn read(&self, ctx: &OpContext, state: &RgwBucket) -> Result<Applied<RgwBucket>> {
        let api = self.client.bind(ctx.cancel_token());
        debug!("Refreshing rgw bucket {}", state.bucket);
        let result = api
            .get_rgw_bucket(&state.bucket)
            .await
            .map(|info| Applied::present(info.into()));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.bucket)
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &RgwBucket,
        _plan: &RgwBucket,
    ) -> Result<Applied<RgwBucket>> {
        Err(Error::NotSupported {
            kind: KIND,
            operation: "update",
        })
    }

    async fn delete(&self, ctx: &OpContext, state: &RgwBucket) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        info!("Deleting rgw bucket {}", state.bucket);
        match api.delete_rgw_bucket(&state.bucket).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("rgw bucket {} was already deleted", state.bucket);
                diagnostics.warn(format!("rgw bucket {} was already deleted", state.bucket), "");
            }
            Err(e) => return Err(e),
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<RgwBucket>> {
        let bucket = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());
        info!("Importing rgw bucket {}", bucket);
        Ok(Applied::present(api.get_rgw_bucket(bucket).await?.into()))
    }
}
