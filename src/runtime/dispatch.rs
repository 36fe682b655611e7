//! Kind-erased access to the controllers
//!
//! The engine works on JSON documents so that one loop can drive every
//! kind. [`Erased`] decodes documents into the controller's model, calls the
//! typed controller and encodes the result back.

use crate::domain::diagnostics::Diagnostics;
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::error::{Error, Result};
use crate::provider::Provider;
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of a controller call in document form
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `None` when the object is gone
    pub state: Option<Value>,
    pub diagnostics: Diagnostics,
}

/// What applying a plan over existing state requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    NoChange,
    Update,
    /// Attributes that force delete-then-create
    Replace(Vec<&'static str>),
}

#[async_trait]
pub trait DynController: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn validate(&self, spec: &Value) -> Result<()>;

    fn plan(&self, prior: &Value, spec: &Value) -> Result<Planned>;

    async fn create(&self, ctx: &OpContext, spec: &Value) -> Result<Outcome>;

    async fn read(&self, ctx: &OpContext, state: &Value) -> Result<Outcome>;

    async fn update(&self, ctx: &OpContext, prior: &Value, spec: &Value) -> Result<Outcome>;

    async fn delete(&self, ctx: &OpContext, state: &Value) -> Result<Diagnostics>;

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Outcome>;
}

/// Adapter from a typed controller to [`DynController`]
pub struct Erased<C>(pub C);

impl<C: ResourceController> Erased<C> {
    fn decode(&self, document: &Value) -> Result<C::Model> {
        serde_json::from_value(document.clone())
            .map_err(|e| Error::validation(format!("invalid {} document: {}", self.0.kind(), e)))
    }

    fn encode(applied: Applied<C::Model>) -> Result<Outcome> {
        let state = match applied.state {
            Some(model) => Some(serde_json::to_value(model)?),
            None => None,
        };
        Ok(Outcome {
            state,
            diagnostics: applied.diagnostics,
        })
    }

    /// The plan with computed attributes carried over from `prior`
    fn carried(&self, prior: &C::Model, spec: &Value) -> Result<C::Model> {
        let mut plan = self.decode(spec)?;
        self.0.carry_computed(prior, &mut plan);
        Ok(plan)
    }
}

#[async_trait]
impl<C: ResourceController> DynController for Erased<C> {
    fn kind(&self) -> ResourceKind {
        self.0.kind()
    }

    fn validate(&self, spec: &Value) -> Result<()> {
        self.0.validate(&self.decode(spec)?)
    }

    fn plan(&self, prior: &Value, spec: &Value) -> Result<Planned> {
        let prior = self.decode(prior)?;
        let plan = self.carried(&prior, spec)?;
        if plan == prior {
            return Ok(Planned::NoChange);
        }
        let triggers = self.0.replace_triggers(&prior, &plan);
        if triggers.is_empty() {
            Ok(Planned::Update)
        } else {
            Ok(Planned::Replace(triggers))
        }
    }

    async fn create(&self, ctx: &OpContext, spec: &Value) -> Result<Outcome> {
        let plan = self.decode(spec)?;
        Self::encode(self.0.create(ctx, &plan).await?)
    }

    async fn read(&self, ctx: &OpContext, state: &Value) -> Result<Outcome> {
        let state = self.decode(state)?;
        Self::encode(self.0.read(ctx, &state).await?)
    }

    async fn update(&self, ctx: &OpContext, prior: &Value, spec: &Value) -> Result<Outcome> {
        let prior = self.decode(prior)?;
        let plan = self.carried(&prior, spec)?;
        Self::encode(self.0.update(ctx, &prior, &plan).await?)
    }

    async fn delete(&self, ctx: &OpContext, state: &Value) -> Result<Diagnostics> {
        let state = self.decode(state)?;
        self.0.delete(ctx, &state).await
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Outcome> {
        Self::encode(self.0.import(ctx, id).await?)
    }
}

/// Controller for a kind, bound to the provider's client
pub fn controller_for(provider: &Provider, kind: ResourceKind) -> Box<dyn DynController> {
    match kind {
        ResourceKind::Auth => Box::new(Erased(provider.auth())),
        ResourceKind::Config => Box::new(Erased(provider.cluster_config())),
        ResourceKind::MgrModule => Box::new(Erased(provider.mgr_module())),
        ResourceKind::MgrModuleConfig => Box::new(Erased(provider.mgr_module_config())),
        ResourceKind::RgwUser => Box::new(Erased(provider.rgw_user())),
        ResourceKind::RgwS3Key => Box::new(Erased(provider.rgw_s3_key())),
        ResourceKind::Pool => Box::new(Erased(provider.pool())),
        ResourceKind::CrushRule => Box::new(Erased(provider.crush_rule())),
        ResourceKind::ErasureCodeProfile => Box::new(Erased(provider.erasure_code_profile())),
        ResourceKind::RgwBucket => Box::new(Erased(provider.rgw_bucket())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::offline_client;
    use serde_json::json;

    fn provider() -> Provider {
        Provider::from_client(offline_client())
    }

    #[test]
    fn test_every_kind_dispatches() {
        let provider = provider();
        for kind in ResourceKind::ALL {
            assert_eq!(controller_for(&provider, kind).kind(), kind);
        }
    }

    #[test]
    fn test_plan_carries_computed_attributes() {
        let controller = controller_for(&provider(), ResourceKind::RgwBucket);
        let prior = json!({
            "bucket": "backups",
            "owner": "alice",
            "zonegroup": "zg1",
            "id": "zg1.1",
            "bid": "zg1.1"
        });

        let same = json!({"bucket": "backups", "owner": "alice"});
        assert_eq!(controller.plan(&prior, &same).unwrap(), Planned::NoChange);

        let moved = json!({"bucket": "backups", "owner": "bob"});
        assert_eq!(
            controller.plan(&prior, &moved).unwrap(),
            Planned::Replace(vec!["owner"])
        );
    }

    #[test]
    fn test_plan_detects_in_place_update() {
        let controller = controller_for(&provider(), ResourceKind::RgwUser);
        let prior = json!({"uid": "alice", "display_name": "Alice", "suspended": false});
        let plan = json!({"uid": "alice", "suspended": true});
        assert_eq!(controller.plan(&prior, &plan).unwrap(), Planned::Update);
    }

    #[test]
    fn test_invalid_document() {
        let controller = controller_for(&provider(), ResourceKind::Pool);
        let err = controller.validate(&json!({"size": "three"})).unwrap_err();
        assert!(err.to_string().contains("invalid ceph_pool document"));
    }
}
