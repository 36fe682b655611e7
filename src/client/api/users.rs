//! Cephx identities (`/api/cluster/user`)

use crate::client::{segment, status, Api, ApiRequest};
use crate::domain::caps::{CapEntry, Capabilities};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity as listed by the Manager
#[derive(Debug, Clone, Deserialize)]
pub struct CephUser {
    pub entity: String,
    #[serde(default)]
    pub caps: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct UserCapsRequest<'a> {
    user_entity: &'a str,
    capabilities: Vec<CapEntry>,
}

#[derive(Serialize)]
struct ImportRequest<'a> {
    import_data: &'a str,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    entities: &'a [&'a str],
}

impl Api<'_> {
    pub async fn list_users(&self) -> Result<Vec<CephUser>> {
        self.fetch(ApiRequest::get("cluster/user", "unable to list ceph users"))
            .await
    }

    /// Export identities as keyring text
    pub async fn export_keyring(&self, entities: &[&str]) -> Result<String> {
        let req = ApiRequest::post(
            "cluster/user/export",
            format!("unable to export keyring for {}", entities.join(", ")),
        )
        .json(&ExportRequest { entities })?
        .accept(status::OK);
        self.fetch(req).await
    }

    pub async fn create_user(&self, entity: &str, caps: &Capabilities) -> Result<()> {
        let req = ApiRequest::post("cluster/user", format!("unable to create ceph user {}", entity))
            .json(&UserCapsRequest {
                user_entity: entity,
                capabilities: caps.to_wire(),
            })?
            .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    /// Create identities from keyring text
    pub async fn import_user(&self, entity: &str, keyring: &str) -> Result<()> {
        let req = ApiRequest::post("cluster/user", format!("unable to import ceph user {}", entity))
            .json(&ImportRequest { import_data: keyring })?
            .accept(status::CREATED_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn update_user(&self, entity: &str, caps: &Capabilities) -> Result<()> {
        let req = ApiRequest::put("cluster/user", format!("unable to update ceph user {}", entity))
            .json(&UserCapsRequest {
                user_entity: entity,
                capabilities: caps.to_wire(),
            })?
            .accept(status::OK_ACCEPTED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn delete_user(&self, entity: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("cluster/user/{}", segment(entity)),
            format!("unable to delete ceph user {}", entity),
        )
        .accept(status::ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }
}
