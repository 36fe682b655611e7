//! CRUSH rule controller (`ceph_crush_rule`)
//!
//! Rules are immutable: every input attribute forces a replacement. Reads use
//! the v2.0 endpoints so the placement steps come back with the rule.

use crate::client::{CephClient, CrushRuleInfo, CrushRuleRequest};
use crate::controllers::pool::PoolType;
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

const KIND: &str = "ceph_crush_rule";

/// CRUSH rule types as encoded in the map
const RULE_TYPE_REPLICATED: u32 = 1;
const RULE_TYPE_ERASURE: u32 = 3;

/// A CRUSH placement rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrushRule {
    pub name: String,
    #[serde(default)]
    pub pool_type: PoolType,
    /// Bucket type replicas are spread across, e.g. `host`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    /// Erasure-code profile; erasure rules only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<serde_json::Value>,
}

impl CrushRule {
    pub fn replicated(name: impl Into<String>, failure_domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_type: PoolType::Replicated,
            failure_domain: Some(failure_domain.into()),
            ..Default::default()
        }
    }

    pub fn erasure(name: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool_type: PoolType::Erasure,
            profile: Some(profile.into()),
            ..Default::default()
        }
    }

    fn request(&self) -> CrushRuleRequest {
        CrushRuleRequest {
            name: self.name.clone(),
            pool_type: Some(self.pool_type.to_string()),
            failure_domain: self.failure_domain.clone(),
            device_class: self.device_class.clone(),
            profile: self.profile.clone(),
            root: self.root.clone(),
        }
    }

    fn with_computed(mut self, info: CrushRuleInfo) -> Self {
        self.rule_id = info.rule_id;
        self.ruleset = info.ruleset;
        self.rule_type = info.rule_type;
        self.min_size = info.min_size;
        self.max_size = info.max_size;
        self.steps = info.steps;
        self
    }

    /// Rebuild the inputs of an existing rule from its placement steps
    fn from_info(info: CrushRuleInfo) -> Self {
        let placement = Placement::from_steps(&info.steps);
        let pool_type = match info.rule_type {
            Some(RULE_TYPE_ERASURE) => PoolType::Erasure,
            Some(RULE_TYPE_REPLICATED) | None => PoolType::Replicated,
            Some(other) => {
                debug!("Crush rule {} has rule type {}, treating it as replicated", info.rule_name, other);
                PoolType::Replicated
            }
        };
        CrushRule {
            name: info.rule_name.clone(),
            pool_type,
            failure_domain: placement.failure_domain,
            device_class: placement.device_class,
            profile: None,
            root: placement.root,
            ..Default::default()
        }
        .with_computed(info)
    }
}

/// Inputs recoverable from a rule's `take` and `choose*` steps
#[derive(Debug, Default, PartialEq)]
struct Placement {
    root: Option<String>,
    device_class: Option<String>,
    failure_domain: Option<String>,
}

impl Placement {
    fn from_steps(steps: &[serde_json::Value]) -> Self {
        let mut placement = Placement::default();
        for step in steps {
            let op = step.get("op").and_then(|v| v.as_str()).unwrap_or_default();
            if op == "take" {
                // shadow roots are named "<root>~<class>"
                if let Some(item) = step.get("item_name").and_then(|v| v.as_str()) {
                    match item.split_once('~') {
                        Some((root, class)) => {
                            placement.root = Some(root.to_string());
                            placement.device_class = Some(class.to_string());
                        }
                        None => placement.root = Some(item.to_string()),
                    }
                }
            } else if op.starts_with("choose") {
                if let Some(kind) = step.get("type").and_then(|v| v.as_str()) {
                    placement.failure_domain = Some(kind.to_string());
                }
            }
        }
        placement
    }
}

pub struct CrushRuleController {
    client: Arc<CephClient>,
}

impl CrushRuleController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// Data-source lookup by rule name
    pub async fn lookup(&self, ctx: &OpContext, name: &str) -> Result<CrushRule> {
        let api = self.client.bind(ctx.cancel_token());
        Ok(CrushRule::from_info(api.get_crush_rule(name).await?))
    }
}

#[async_trait]
impl ResourceController for CrushRuleController {
    type Model = CrushRule;

    fn kind(&self) -> ResourceKind {
        ResourceKind::CrushRule
    }

    fn validate(&self, plan: &CrushRule) -> Result<()> {
        if plan.name.trim().is_empty() {
            return Err(Error::validation_at(AttrPath::attr("name"), "name must not be empty"));
        }
        match plan.pool_type {
            PoolType::Replicated => {
                if plan.profile.is_some() {
                    return Err(Error::validation_at(
                        AttrPath::attr("profile"),
                        "profile is only valid for erasure rules",
                    ));
                }
                if plan.failure_domain.is_none() {
                    return Err(Error::validation_at(
                        AttrPath::attr("failure_domain"),
                        "failure_domain is required for replicated rules",
                    ));
                }
            }
            PoolType::Erasure => {
                if plan.profile.is_none() {
                    return Err(Error::validation_at(
                        AttrPath::attr("profile"),
                        "profile is required for erasure rules",
                    ));
                }
            }
        }
        Ok(())
    }

    fn replace_triggers(&self, prior: &CrushRule, plan: &CrushRule) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.name != plan.name {
            triggers.push("name");
        }
        if prior.pool_type != plan.pool_type {
            triggers.push("pool_type");
        }
        if prior.failure_domain != plan.failure_domain {
            triggers.push("failure_domain");
        }
        if prior.device_class != plan.device_class {
            triggers.push("device_class");
        }
        if prior.profile != plan.profile {
            triggers.push("profile");
        }
        if prior.root != plan.root {
            triggers.push("root");
        }
        triggers
    }

    fn carry_computed(&self, prior: &CrushRule, plan: &mut CrushRule) {
        plan.rule_id = prior.rule_id;
        plan.ruleset = prior.ruleset;
        plan.rule_type = prior.rule_type;
        plan.min_size = prior.min_size;
        plan.max_size = prior.max_size;
        plan.steps = prior.steps.clone();
    }

    async fn create(&self, ctx: &OpContext, plan: &CrushRule) -> Result<Applied<CrushRule>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Creating {} crush rule {}", plan.pool_type, plan.name);
        api.create_crush_rule(&plan.request()).await?;

        let info = api.get_crush_rule(&plan.name).await?;
        Ok(Applied::present(plan.clone().with_computed(info)))
    }

    async fn read(&self, ctx: &OpContext, state: &CrushRule) -> Result<Applied<CrushRule>> {
        let api = self.client.bind(ctx.cancel_token());
        debug!("Refreshing crush rule {}", state.name);
        let result = api
            .get_crush_rule(&state.name)
            .await
            .map(|info| Applied::present(state.clone().with_computed(info)));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.name)
    }

    async fn update(
        &self,
        _ctx: &OpContext,
        _prior: &CrushRule,
        _plan: &CrushRule,
    ) -> Result<Applied<CrushRule>> {
        Err(Error::NotSupported {
            kind: KIND,
            operation: "update",
        })
    }

    async fn delete(&self, ctx: &OpContext, state: &CrushRule) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());

        info!("Deleting crush rule {}", state.name);
        api.delete_crush_rule(&state.name).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                e.with_hint(format!(
                    "crush rule {} may still be referenced by a pool; remove or reassign the pool first",
                    state.name
                ))
            }
        })?;
        Ok(Diagnostics::new())
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<CrushRule>> {
        let name = import::parse_name(KIND, id)?;
        info!("Importing crush rule {}", name);
        Ok(Applied::present(self.lookup(ctx, name).await?))
    }
}
