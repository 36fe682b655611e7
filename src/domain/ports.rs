//! Domain Ports - the contract every resource controller implements
//!
//! The host runtime drives each declared resource through
//! `create / read / update / delete / import`. Controllers implement
//! [`ResourceController`]; the host never talks to the REST client directly.

use crate::domain::diagnostics::Diagnostics;
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Operation Context
// =============================================================================

/// Per-operation context handed to every controller call
///
/// Cancelling the token aborts the in-flight request and surfaces
/// [`crate::Error::Cancelled`] from the current operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// =============================================================================
// Results
// =============================================================================

/// Authoritative state produced by a controller operation
#[derive(Debug, Clone)]
pub struct Applied<M> {
    /// `None` means the object is gone and the resource leaves state
    pub state: Option<M>,
    pub diagnostics: Diagnostics,
}

impl<M> Applied<M> {
    pub fn present(state: M) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn removed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    pub fn is_removed(&self) -> bool {
        self.state.is_none()
    }
}

// =============================================================================
// Resource Kinds
// =============================================================================

/// Kinds of managed Ceph objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Auth,
    Config,
    MgrModule,
    MgrModuleConfig,
    RgwUser,
    RgwS3Key,
    Pool,
    CrushRule,
    ErasureCodeProfile,
    RgwBucket,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Auth,
        ResourceKind::Config,
        ResourceKind::MgrModule,
        ResourceKind::MgrModuleConfig,
        ResourceKind::RgwUser,
        ResourceKind::RgwS3Key,
        ResourceKind::Pool,
        ResourceKind::CrushRule,
        ResourceKind::ErasureCodeProfile,
        ResourceKind::RgwBucket,
    ];

    /// Type name as it appears in manifests and diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Auth => "ceph_auth",
            ResourceKind::Config => "ceph_config",
            ResourceKind::MgrModule => "ceph_mgr_module",
            ResourceKind::MgrModuleConfig => "ceph_mgr_module_config",
            ResourceKind::RgwUser => "ceph_rgw_user",
            ResourceKind::RgwS3Key => "ceph_rgw_s3_key",
            ResourceKind::Pool => "ceph_pool",
            ResourceKind::CrushRule => "ceph_crush_rule",
            ResourceKind::ErasureCodeProfile => "ceph_erasure_code_profile",
            ResourceKind::RgwBucket => "ceph_rgw_bucket",
        }
    }

    /// Attributes the host must mask when rendering state
    pub fn sensitive_attributes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Auth => &["key", "keyring"],
            ResourceKind::RgwS3Key => &["secret_key"],
            _ => &[],
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// =============================================================================
// Resource Controller Port
// =============================================================================

/// Lifecycle contract for one managed object kind
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Desired/authoritative model of one resource instance
    type Model: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// Static checks run before any network call
    fn validate(&self, _plan: &Self::Model) -> Result<()> {
        Ok(())
    }

    /// Attributes whose change between `prior` and `plan` forces the host to
    /// delete and re-create the resource instead of calling `update`
    fn replace_triggers(&self, _prior: &Self::Model, _plan: &Self::Model) -> Vec<&'static str> {
        Vec::new()
    }

    /// Copy server-computed attributes from `prior` into `plan` where the
    /// plan leaves them unset, so that equality means "no change"
    fn carry_computed(&self, _prior: &Self::Model, _plan: &mut Self::Model) {}

    async fn create(&self, ctx: &OpContext, plan: &Self::Model) -> Result<Applied<Self::Model>>;

    async fn read(&self, ctx: &OpContext, state: &Self::Model) -> Result<Applied<Self::Model>>;

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &Self::Model,
        plan: &Self::Model,
    ) -> Result<Applied<Self::Model>>;

    async fn delete(&self, ctx: &OpContext, state: &Self::Model) -> Result<Diagnostics>;

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<Self::Model>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_type_names_roundtrip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_type_name(kind.type_name()), Some(kind));
        }
        assert_eq!(ResourceKind::from_type_name("ceph_volume"), None);
        assert_eq!(format!("{}", ResourceKind::Config), "ceph_config");
    }

    #[test]
    fn test_sensitive_attributes() {
        assert_eq!(ResourceKind::Auth.sensitive_attributes(), &["key", "keyring"]);
        assert_eq!(ResourceKind::RgwS3Key.sensitive_attributes(), &["secret_key"]);
        assert!(ResourceKind::Pool.sensitive_attributes().is_empty());
    }

    #[test]
    fn test_applied_helpers() {
        let applied = Applied::present(1u32);
        assert!(!applied.is_removed());

        let mut diags = Diagnostics::new();
        diags.warn("gone", "");
        let applied: Applied<u32> = Applied::removed(diags);
        assert!(applied.is_removed());
        assert_eq!(applied.diagnostics.len(), 1);
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = OpContext::new(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
