//! Typed Manager API endpoints
//!
//! Each submodule adds the calls for one area of the API to [`Api`] and
//! defines the wire shapes it exchanges. Paths, accept versions and
//! accepted status sets live here and nowhere else.
//!
//! [`Api`]: crate::client::Api

pub mod cluster_conf;
pub mod crush_rule;
pub(crate) mod de;
pub mod erasure_code_profile;
pub mod mgr;
pub mod pool;
pub mod rgw;
pub mod users;

pub use cluster_conf::{ConfigOption, SectionValue};
pub use crush_rule::{CrushRuleInfo, CrushRuleRequest};
pub use erasure_code_profile::{ErasureCodeProfileInfo, ErasureCodeProfileRequest};
pub use mgr::{MgrModuleInfo, MgrModuleOption};
pub use pool::{PoolInfo, PoolRequest};
pub use rgw::{BucketCreateRequest, RgwBucketInfo, RgwKey, RgwUserInfo, RgwUserRequest, S3KeyRequest};
pub use users::CephUser;
