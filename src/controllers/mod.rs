//! Resource controllers
//!
//! One controller per managed Ceph object kind. Each implements
//! [`ResourceController`](crate::domain::ResourceController) over a shared
//! [`CephClient`](crate::client::CephClient).

pub mod auth;
pub mod cluster_config;
pub mod crush_rule;
pub mod erasure_code_profile;
pub mod mgr_module;
pub mod mgr_module_config;
pub mod pool;
pub mod rgw_bucket;
pub mod rgw_s3_key;
pub mod rgw_user;

pub use auth::{AuthController, AuthIdentity};
pub use cluster_config::{ClusterConfig, ClusterConfigController};
pub use crush_rule::{CrushRule, CrushRuleController};
pub use erasure_code_profile::{ErasureCodeProfile, ErasureCodeProfileController};
pub use mgr_module::{MgrModule, MgrModuleController};
pub use mgr_module_config::{MgrModuleConfig, MgrModuleConfigController};
pub use pool::{Pool, PoolController, PoolType};
pub use rgw_bucket::{RgwBucket, RgwBucketController};
pub use rgw_s3_key::{RgwS3Key, RgwS3KeyController};
pub use rgw_user::{RgwUser, RgwUserController};
