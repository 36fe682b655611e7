//! Pool controller (`ceph_pool`)
//!
//! Pool type, replica count, CRUSH rule and erasure-code profile are fixed
//! at creation; changing them replaces the pool. Everything else, including
//! the name, is updated in place.

use crate::client::{CephClient, PoolInfo, PoolRequest};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_pool";

/// Placement groups requested when the plan leaves `pg_num` unset
pub const DEFAULT_PG_NUM: u32 = 32;

const AUTOSCALE_MODES: [&str; 3] = ["on", "off", "warn"];

/// Value the Manager takes as "remove this compression option"
const UNSET: &str = "unset";

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    #[default]
    Replicated,
    Erasure,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Replicated => "replicated",
            PoolType::Erasure => "erasure",
        }
    }

    pub fn from_wire(value: &str) -> Result<Self> {
        match value {
            "replicated" => Ok(PoolType::Replicated),
            "erasure" => Ok(PoolType::Erasure),
            other => Err(Error::Parse(format!("unknown pool type {:?}", other))),
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A RADOS pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pool {
    pub name: String,
    #[serde(default)]
    pub pool_type: PoolType,
    /// Replica count; replicated pools only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Replicated pools only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_num: Option<u32>,
    /// `on`, `off` or `warn`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_autoscale_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crush_rule: Option<String>,
    /// Erasure pools only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erasure_code_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_required_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_min_blob_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_max_blob_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_max_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_max_objects: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub application_metadata: BTreeSet<String>,
    /// Numeric pool id (computed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<u64>,
}

impl Pool {
    pub fn new(name: impl Into<String>, pool_type: PoolType) -> Self {
        Self {
            name: name.into(),
            pool_type,
            ..Default::default()
        }
    }

    fn autoscaling(&self) -> bool {
        self.pg_autoscale_mode.as_deref() == Some("on")
    }

    fn from_info(info: PoolInfo) -> Result<Self> {
        let option_str = |key: &str| {
            info.options
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty() && *s != UNSET)
                .map(str::to_string)
        };
        // a zero size or ratio is how a reset option reads back
        let option_u64 = |key: &str| {
            info.options
                .get(key)
                .and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .filter(|n| *n != 0)
        };
        let option_f64 = |key: &str| {
            info.options
                .get(key)
                .and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .filter(|r| *r != 0.0)
        };

        let pool_type = if info.pool_type.is_empty() {
            PoolType::default()
        } else {
            PoolType::from_wire(&info.pool_type)?
        };
        let compression_mode = option_str("compression_mode");
        let compressing = matches!(compression_mode.as_deref(), Some(m) if m != "none");
        Ok(Pool {
            pool_type,
            size: info.size.filter(|_| pool_type == PoolType::Replicated),
            min_size: info.min_size.filter(|_| pool_type == PoolType::Replicated),
            pg_num: info.pg_num,
            pg_autoscale_mode: info.pg_autoscale_mode.clone(),
            crush_rule: info.crush_rule.clone(),
            erasure_code_profile: info
                .erasure_code_profile
                .clone()
                .filter(|_| pool_type == PoolType::Erasure),
            // sub-options left behind by a disabled mode have no effect
            compression_algorithm: option_str("compression_algorithm").filter(|_| compressing),
            compression_required_ratio: option_f64("compression_required_ratio")
                .filter(|_| compressing),
            compression_min_blob_size: option_u64("compression_min_blob_size")
                .filter(|_| compressing),
            compression_max_blob_size: option_u64("compression_max_blob_size")
                .filter(|_| compressing),
            compression_mode,
            // zero is unlimited
            quota_max_bytes: info.quota_max_bytes.filter(|q| *q != 0),
            quota_max_objects: info.quota_max_objects.filter(|q| *q != 0),
            application_metadata: info.application_metadata.iter().cloned().collect(),
            pool_id: info.pool_id,
            name: info.pool_name,
        })
    }

    fn create_request(&self) -> PoolRequest {
        PoolRequest {
            pool: Some(self.name.clone()),
            pool_type: Some(self.pool_type.to_string()),
            pg_num: Some(self.pg_num.unwrap_or(DEFAULT_PG_NUM)),
            pg_autoscale_mode: self.pg_autoscale_mode.clone(),
            size: self.size,
            min_size: self.min_size,
            rule_name: self.crush_rule.clone(),
            erasure_code_profile: self.erasure_code_profile.clone(),
            compression_mode: self.compression_mode.clone(),
            compression_algorithm: self.compression_algorithm.clone(),
            compression_required_ratio: self.compression_required_ratio,
            compression_min_blob_size: self.compression_min_blob_size,
            compression_max_blob_size: self.compression_max_blob_size,
            quota_max_bytes: self.quota_max_bytes,
            quota_max_objects: self.quota_max_objects,
            application_metadata: if self.application_metadata.is_empty() {
                None
            } else {
                Some(self.application_metadata.iter().cloned().collect())
            },
        }
    }

    /// Fields that changed between `prior` and `self` and can be updated in place
    ///
    /// Compression options and quotas dropped from the plan are reset on the
    /// server.
    fn update_request(&self, prior: &Pool) -> PoolRequest {
        fn changed<T: PartialEq + Clone>(prior: &Option<T>, plan: &Option<T>) -> Option<T> {
            if plan != prior {
                plan.clone()
            } else {
                None
            }
        }
        fn changed_or_reset<T: PartialEq + Clone>(
            prior: &Option<T>,
            plan: &Option<T>,
            reset: T,
        ) -> Option<T> {
            match (prior, plan) {
                (Some(_), None) => Some(reset),
                _ => changed(prior, plan),
            }
        }

        PoolRequest {
            pool: (self.name != prior.name).then(|| self.name.clone()),
            pg_num: changed(&prior.pg_num, &self.pg_num),
            pg_autoscale_mode: changed(&prior.pg_autoscale_mode, &self.pg_autoscale_mode),
            min_size: changed(&prior.min_size, &self.min_size),
            compression_mode: changed_or_reset(
                &prior.compression_mode,
                &self.compression_mode,
                UNSET.to_string(),
            ),
            compression_algorithm: changed_or_reset(
                &prior.compression_algorithm,
                &self.compression_algorithm,
                UNSET.to_string(),
            ),
            compression_required_ratio: changed_or_reset(
                &prior.compression_required_ratio,
                &self.compression_required_ratio,
                0.0,
            ),
            compression_min_blob_size: changed_or_reset(
                &prior.compression_min_blob_size,
                &self.compression_min_blob_size,
                0,
            ),
            compression_max_blob_size: changed_or_reset(
                &prior.compression_max_blob_size,
                &self.compression_max_blob_size,
                0,
            ),
            quota_max_bytes: changed_or_reset(&prior.quota_max_bytes, &self.quota_max_bytes, 0),
            quota_max_objects: changed_or_reset(
                &prior.quota_max_objects,
                &self.quota_max_objects,
                0,
            ),
            application_metadata: (self.application_metadata != prior.application_metadata)
                .then(|| self.application_metadata.iter().cloned().collect()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_pool(plan: &Pool) -> Result<()> {
    if plan.name.trim().is_empty() {
        return Err(Error::validation_at(AttrPath::attr("name"), "name must not be empty"));
    }

    if plan.pool_type != PoolType::Replicated {
        for (attr, set) in [("size", plan.size.is_some()), ("min_size", plan.min_size.is_some())] {
            if set {
                return Err(Error::validation_at(
                    AttrPath::attr(attr),
                    format!("{} is only valid for replicated pools", attr),
                ));
            }
        }
    }
    if plan.pool_type != PoolType::Erasure && plan.erasure_code_profile.is_some() {
        return Err(Error::validation_at(
            AttrPath::attr("erasure_code_profile"),
            "erasure_code_profile is only valid for erasure pools",
        ));
    }
    if let (Some(size), Some(min_size)) = (plan.size, plan.min_size) {
        if min_size > size {
            return Err(Error::validation_at(
                AttrPath::attr("min_size"),
                format!("min_size {} must not exceed size {}", min_size, size),
            ));
        }
    }

    if let Some(mode) = &plan.pg_autoscale_mode {
        if !AUTOSCALE_MODES.contains(&mode.as_str()) {
            return Err(Error::validation_at(
                AttrPath::attr("pg_autoscale_mode"),
                format!("pg_autoscale_mode must be one of on, off, warn; got {:?}", mode),
            ));
        }
    }

    let compression_enabled = matches!(plan.compression_mode.as_deref(), Some(m) if m != "none");
    let sub_options = [
        ("compression_algorithm", plan.compression_algorithm.is_some()),
        ("compression_required_ratio", plan.compression_required_ratio.is_some()),
        ("compression_min_blob_size", plan.compression_min_blob_size.is_some()),
        ("compression_max_blob_size", plan.compression_max_blob_size.is_some()),
    ];
    for (attr, set) in sub_options {
        if set && !compression_enabled {
            return Err(Error::validation_at(
                AttrPath::attr(attr),
                format!("{} requires compression_mode to be set to a value other than none", attr),
            ));
        }
    }
    if let Some(ratio) = plan.compression_required_ratio {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::validation_at(
                AttrPath::attr("compression_required_ratio"),
                "compression_required_ratio must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Controller
// =============================================================================

pub struct PoolController {
    client: Arc<CephClient>,
}

impl PoolController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceController for PoolController {
    type Model = Pool;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Pool
    }

    fn validate(&self, plan: &Pool) -> Result<()> {
        validate_pool(plan)
    }

    fn replace_triggers(&self, prior: &Pool, plan: &Pool) -> Vec<&'static str> {
        let mut triggers = Vec::new();
        if prior.pool_type != plan.pool_type {
            triggers.push("pool_type");
        }
        if plan.size.is_some() && plan.size != prior.size {
            triggers.push("size");
        }
        if plan.crush_rule.is_some() && plan.crush_rule != prior.crush_rule {
            triggers.push("crush_rule");
        }
        if plan.erasure_code_profile.is_some() && plan.erasure_code_profile != prior.erasure_code_profile {
            triggers.push("erasure_code_profile");
        }
        // shrinking placement groups is only safe when the autoscaler drives it
        if let (Some(old), Some(new)) = (prior.pg_num, plan.pg_num) {
            if new < old && !plan.autoscaling() {
                triggers.push("pg_num");
            }
        }
        triggers
    }

    fn carry_computed(&self, prior: &Pool, plan: &mut Pool) {
        // server-chosen defaults only; compression options and quotas follow the plan
        macro_rules! carry {
            ($($field:ident),*) => {
                $(if plan.$field.is_none() {
                    plan.$field = prior.$field.clone();
                })*
            };
        }
        carry!(
            size,
            min_size,
            pg_num,
            pg_autoscale_mode,
            crush_rule,
            erasure_code_profile
        );
        plan.quota_max_bytes = plan.quota_max_bytes.filter(|q| *q != 0);
        plan.quota_max_objects = plan.quota_max_objects.filter(|q| *q != 0);
        // the autoscaler owns pg_num while it is on
        if plan.autoscaling() && prior.autoscaling() {
            plan.pg_num = prior.pg_num;
        }
        plan.pool_id = prior.pool_id;
    }

    async fn create(&self, ctx: &OpContext, plan: &Pool) -> Result<Applied<Pool>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Creating {} pool {}", plan.pool_type, plan.name);
        api.create_pool(&plan.create_request()).await?;

        let state = Pool::from_info(api.get_pool(&plan.name).await?)?;
        Ok(Applied::present(state))
    }

    async fn read(&self, ctx: &OpContext, state: &Pool) -> Result<Applied<Pool>> {
        let api = self.client.bind(ctx.cancel_token());
        debug!("Refreshing pool {}", state.name);
        let result = match api.get_pool(&state.name).await {
            Ok(info) => Pool::from_info(info).map(Applied::present),
            Err(e) => Err(e),
        };
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.name)
    }

    async fn update(&self, ctx: &OpContext, prior: &Pool, plan: &Pool) -> Result<Applied<Pool>> {
        self.validate(plan)?;
        let triggers = self.replace_triggers(prior, plan);
        if !triggers.is_empty() {
            return Err(Error::validation(format!(
                "pool {} cannot be updated in place; changed attributes require replacement: {}",
                prior.name,
                triggers.join(", ")
            )));
        }
        let api = self.client.bind(ctx.cancel_token());

        let request = plan.update_request(prior);
        if request.is_empty() {
            debug!("Pool {} is up to date", prior.name);
        } else {
            info!("Updating pool {}", prior.name);
            api.update_pool(&prior.name, &request).await?;
        }

        let state = Pool::from_info(api.get_pool(&plan.name).await?)?;
        Ok(Applied::present(state))
    }

    async fn delete(&self, ctx: &OpContext, state: &Pool) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        info!("Deleting pool {}", state.name);
        match api.delete_pool(&state.name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("Pool {} was already deleted", state.name);
                diagnostics.warn(format!("pool {} was already deleted", state.name), "");
            }
            Err(e) => return Err(e),
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<Pool>> {
        let name = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());
        info!("Importing pool {}", name);
        Ok(Applied::present(Pool::from_info(api.get_pool(name).await?)?))
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
    use serde_json::{json, Value};

    fn rbd_info(min_size: u32, name: &str) -> Value {
        json!({
            "pool_name": name,
            "pool": 5,
            "type": "replicated",
            "size": 3,
            "min_size": min_size,
            "pg_num": 32,
            "pg_autoscale_mode": "off",
            "crush_rule": "replicated_rule",
            "erasure_code_profile": "",
            "quota_max_bytes": 0,
            "quota_max_objects": 0,
            "application_metadata": ["rbd"],
            "options": {}
        })
    }

    fn rbd_plan() -> Pool {
        let mut plan = Pool::new("rbd", PoolType::Replicated);
        plan.size = Some(3);
        plan.pg_autoscale_mode = Some("off".into());
        plan.application_metadata.insert("rbd".into());
        plan
    }

    #[tokio::test]
    async fn test_create_and_rename() {
        let mut server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/pool"),
                request::body(json_decoded(eq(json!({
                    "pool": "rbd",
                    "pool_type": "replicated",
                    "pg_num": 32,
                    "pg_autoscale_mode": "off",
                    "size": 3,
                    "application_metadata": ["rbd"]
                })))),
            ])
            .respond_with(status_code(201)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/pool/rbd"))
                .respond_with(json_encoded(rbd_info(2, "rbd"))),
        );

        let controller = PoolController::new(client_for(&server));
        let ctx = OpContext::default();
        let state = controller.create(&ctx, &rbd_plan()).await.unwrap().state.unwrap();
        assert_eq!(state.pool_id, Some(5));
        assert_eq!(state.erasure_code_profile, None);
        server.verify_and_clear();

        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/pool/rbd"),
                request::body(json_decoded(eq(json!({"pool": "volumes", "min_size": 1})))),
            ])
            .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/pool/volumes"))
                .respond_with(json_encoded(rbd_info(1, "volumes"))),
        );

        let mut next = rbd_plan();
        next.name = "volumes".into();
        next.min_size = Some(1);
        controller.carry_computed(&state, &mut next);
        assert!(controller.replace_triggers(&state, &next).is_empty());
        let renamed = controller.update(&ctx, &state, &next).await.unwrap().state.unwrap();
        assert_eq!(renamed.name, "volumes");
        assert_eq!(renamed.min_size, Some(1));
    }

    #[test]
    fn test_validation_matrix() {
        let mut erasure = Pool::new("ec", PoolType::Erasure);
        erasure.size = Some(3);
        assert_matches!(validate_pool(&erasure), Err(Error::Validation { .. }));

        let mut replicated = Pool::new("rep", PoolType::Replicated);
        replicated.erasure_code_profile = Some("ec42".into());
        assert!(validate_pool(&replicated).is_err());

        let mut compressed = Pool::new("rep", PoolType::Replicated);
        compressed.compression_algorithm = Some("zstd".into());
        assert!(validate_pool(&compressed).is_err());
        compressed.compression_mode = Some("none".into());
        assert!(validate_pool(&compressed).is_err());
        compressed.compression_mode = Some("aggressive".into());
        assert!(validate_pool(&compressed).is_ok());

        let mut bad_mode = Pool::new("rep", PoolType::Replicated);
        bad_mode.pg_autoscale_mode = Some("maybe".into());
        assert!(validate_pool(&bad_mode).is_err());

        let mut ec = Pool::new("ec", PoolType::Erasure);
        ec.erasure_code_profile = Some("ec42".into());
        assert!(validate_pool(&ec).is_ok());
    }

    #[test]
    fn test_replace_triggers() {
        let controller = PoolController::new(offline_client());
        let mut prior = rbd_plan();
        prior.pg_num = Some(64);
        prior.crush_rule = Some("replicated_rule".into());

        let mut plan = prior.clone();
        plan.size = Some(2);
        plan.crush_rule = Some("ssd_rule".into());
        plan.pg_num = Some(32);
        assert_eq!(
            controller.replace_triggers(&prior, &plan),
            vec!["size", "crush_rule", "pg_num"]
        );

        // pg_num may shrink when the autoscaler is on
        let mut autoscaled = prior.clone();
        autoscaled.pg_autoscale_mode = Some("on".into());
        autoscaled.pg_num = Some(16);
        assert!(controller.replace_triggers(&prior, &autoscaled).is_empty());

        let mut grown = prior.clone();
        grown.pg_num = Some(128);
        assert!(controller.replace_triggers(&prior, &grown).is_empty());

        let mut retyped = prior.clone();
        retyped.pool_type = PoolType::Erasure;
        assert_eq!(controller.replace_triggers(&prior, &retyped), vec!["pool_type"]);
    }

    #[test]
    fn test_compression_options_read_from_pool_options() {
        let info: PoolInfo = serde_json::from_value(json!({
            "pool_name": "data",
            "type": "erasure",
            "size": 6,
            "erasure_code_profile": "ec42",
            "options": {
                "compression_mode": "aggressive",
                "compression_algorithm": "zstd",
                "compression_required_ratio": 0.875,
                "compression_min_blob_size": "8192"
            }
        }))
        .unwrap();

        let pool = Pool::from_info(info).unwrap();
        assert_eq!(pool.size, None);
        assert_eq!(pool.erasure_code_profile.as_deref(), Some("ec42"));
        assert_eq!(pool.compression_required_ratio, Some(0.875));
        assert_eq!(pool.compression_min_blob_size, Some(8192));
    }

    fn compressed_info(options: Value, quota_max_bytes: u64) -> Value {
        let mut info = rbd_info(2, "rbd");
        info["options"] = options;
        info["quota_max_bytes"] = json!(quota_max_bytes);
        info
    }

    #[tokio::test]
    async fn test_disable_compression_in_place() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/pool/rbd"),
                request::body(json_decoded(eq(json!({
                    "compression_mode": "none",
                    "compression_algorithm": "unset"
                })))),
            ])
            .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/pool/rbd"))
                .respond_with(json_encoded(compressed_info(
                    json!({"compression_mode": "none"}),
                    0,
                ))),
        );

        let controller = PoolController::new(client_for(&server));
        let prior = Pool::from_info(
            serde_json::from_value(compressed_info(
                json!({"compression_mode": "aggressive", "compression_algorithm": "zstd"}),
                0,
            ))
            .unwrap(),
        )
        .unwrap();

        let mut plan = rbd_plan();
        plan.compression_mode = Some("none".into());
        controller.carry_computed(&prior, &mut plan);
        assert_eq!(plan.compression_algorithm, None);
        assert!(controller.validate(&plan).is_ok());
        assert!(controller.replace_triggers(&prior, &plan).is_empty());

        let state = controller
            .update(&OpContext::default(), &prior, &plan)
            .await
            .unwrap()
            .state
            .unwrap();
        assert_eq!(state.compression_mode.as_deref(), Some("none"));
        assert_eq!(state.compression_algorithm, None);

        let mut again = rbd_plan();
        again.compression_mode = Some("none".into());
        controller.carry_computed(&state, &mut again);
        assert_eq!(again, state);
    }

    #[tokio::test]
    async fn test_dropped_quota_and_compression_are_reset() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/pool/rbd"),
                request::body(json_decoded(eq(json!({
                    "compression_mode": "unset",
                    "compression_algorithm": "unset",
                    "compression_min_blob_size": 0,
                    "quota_max_bytes": 0
                })))),
            ])
            .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/pool/rbd"))
                .respond_with(json_encoded(compressed_info(json!({}), 0))),
        );

        let controller = PoolController::new(client_for(&server));
        let prior = Pool::from_info(
            serde_json::from_value(compressed_info(
                json!({
                    "compression_mode": "passive",
                    "compression_algorithm": "lz4",
                    "compression_min_blob_size": "4096"
                }),
                1 << 30,
            ))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(prior.quota_max_bytes, Some(1 << 30));

        let mut plan = rbd_plan();
        controller.carry_computed(&prior, &mut plan);
        assert_ne!(plan, prior);

        let state = controller
            .update(&OpContext::default(), &prior, &plan)
            .await
            .unwrap()
            .state
            .unwrap();
        assert_eq!(state.quota_max_bytes, None);
        assert_eq!(state.compression_mode, None);

        let mut again = rbd_plan();
        controller.carry_computed(&state, &mut again);
        assert_eq!(again, state);
    }

    #[test]
    fn test_zero_quota_means_unlimited() {
        let controller = PoolController::new(offline_client());
        let prior = Pool::from_info(serde_json::from_value(rbd_info(2, "rbd")).unwrap()).unwrap();
        assert_eq!(prior.quota_max_objects, None);

        let mut plan = rbd_plan();
        plan.quota_max_objects = Some(0);
        controller.carry_computed(&prior, &mut plan);
        assert_eq!(plan, prior);
    }

    #[tokio::test]
    async fn test_read_missing_pool_is_drift() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/pool/rbd"))
                .respond_with(status_code(404)),
        );

        let controller = PoolController::new(client_for(&server));
        let applied = controller.read(&OpContext::default(), &rbd_plan()).await.unwrap();
        assert!(applied.is_removed());
    }
}
