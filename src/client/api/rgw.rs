//! RADOS Gateway users, S3 keys and buckets (`/api/rgw/...`)

use crate::client::api::de::{empty_as_none, flex_bool, flex_i64_opt};
use crate::client::{decode, segment, status, Api, ApiRequest};
use crate::error::Result;
use serde::{Deserialize, Serialize};

// =============================================================================
// Users
// =============================================================================

/// User as returned by the gateway admin API
///
/// The dashboard sends both `uid` (the full, tenant-qualified id) and the
/// admin API's `user_id`; older releases send only `user_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RgwUserInfo {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "flex_i64_opt")]
    pub max_buckets: Option<i64>,
    #[serde(default, deserialize_with = "flex_bool")]
    pub system: bool,
    #[serde(default, deserialize_with = "flex_bool")]
    pub suspended: bool,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub tenant: Option<String>,
    #[serde(default, deserialize_with = "flex_bool")]
    pub admin: bool,
    #[serde(default)]
    pub keys: Vec<RgwKey>,
}

/// One S3 key pair of a user or subuser
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RgwKey {
    /// Owning uid, `parent:subuser` for subuser keys
    pub user: String,
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_active", deserialize_with = "flex_bool")]
    pub active: bool,
}

impl RgwUserInfo {
    /// The user id, whichever field carried it
    pub fn id(&self) -> &str {
        if self.uid.is_empty() {
            &self.user_id
        } else {
            &self.uid
        }
    }
}

fn default_active() -> bool {
    true
}

/// Fields of a user create/update request
///
/// Absent fields are left out of the request body entirely; `suspended`
/// goes out as `0`/`1`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RgwUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_key: Option<bool>,
}

// =============================================================================
// Keys
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct S3KeyRequest {
    pub uid: String,
    pub key_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subuser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_key: Option<bool>,
}

// =============================================================================
// Buckets
// =============================================================================

/// Bucket as returned by the gateway admin API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RgwBucketInfo {
    pub bucket: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub zonegroup: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub placement_rule: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub acl: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCreateRequest {
    pub bucket: String,
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zonegroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_target: Option<String>,
}

impl Api<'_> {
    pub async fn create_rgw_user(&self, request: &RgwUserRequest) -> Result<RgwUserInfo> {
        let uid = request.uid.as_deref().unwrap_or_default();
        let req = ApiRequest::post("rgw/user", format!("unable to create rgw user {}", uid))
            .json(request)?
            .accept(status::OK_CREATED);
        self.fetch(req).await
    }

    pub async fn get_rgw_user(&self, uid: &str) -> Result<RgwUserInfo> {
        self.fetch(ApiRequest::get(
            format!("rgw/user/{}", segment(uid)),
            format!("unable to read rgw user {}", uid),
        ))
        .await
    }

    /// Update the given fields; some gateway releases answer with an empty
    /// body, in which case `None` is returned
    pub async fn update_rgw_user(
        &self,
        uid: &str,
        request: &RgwUserRequest,
    ) -> Result<Option<RgwUserInfo>> {
        let operation = format!("unable to update rgw user {}", uid);
        let req = ApiRequest::put(format!("rgw/user/{}", segment(uid)), operation.clone())
            .json(request)?
            .accept(status::OK_ACCEPTED);
        let response = self.send(req).await?;
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        decode(&operation, &response.body).map(Some)
    }

    pub async fn delete_rgw_user(&self, uid: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("rgw/user/{}", segment(uid)),
            format!("unable to delete rgw user {}", uid),
        )
        .accept(status::OK_ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }

    /// Create an S3 key; the response lists every key of the user
    pub async fn create_s3_key(&self, parent: &str, request: &S3KeyRequest) -> Result<Vec<RgwKey>> {
        let req = ApiRequest::post(
            format!("rgw/user/{}/key", segment(parent)),
            format!("unable to create s3 key for rgw user {}", request.uid),
        )
        .json(request)?
        .accept(status::OK_CREATED);
        self.fetch(req).await
    }

    pub async fn delete_s3_key(
        &self,
        parent: &str,
        access_key: &str,
        subuser: Option<&str>,
    ) -> Result<()> {
        let req = ApiRequest::delete(
            format!("rgw/user/{}/key", segment(parent)),
            format!("unable to delete s3 key {} of rgw user {}", access_key, parent),
        )
        .query("key_type", "s3")
        .query("access_key", access_key)
        .query_opt("subuser", subuser)
        .accept(status::OK_ACCEPTED_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn create_rgw_bucket(&self, request: &BucketCreateRequest) -> Result<()> {
        let req = ApiRequest::post(
            "rgw/bucket",
            format!("unable to create rgw bucket {}", request.bucket),
        )
        .json(request)?
        .accept(status::OK_CREATED);
        self.execute(req).await?;
        Ok(())
    }

    pub async fn get_rgw_bucket(&self, bucket: &str) -> Result<RgwBucketInfo> {
        self.fetch(ApiRequest::get(
            format!("rgw/bucket/{}", segment(bucket)),
            format!("unable to read rgw bucket {}", bucket),
        ))
        .await
    }

    pub async fn delete_rgw_bucket(&self, bucket: &str) -> Result<()> {
        let req = ApiRequest::delete(
            format!("rgw/bucket/{}", segment(bucket)),
            format!("unable to delete rgw bucket {}", bucket),
        )
        .accept(status::OK_OR_NO_CONTENT);
        self.execute(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_info_wire_encodings() {
        let info: RgwUserInfo = serde_json::from_value(json!({
            "user_id": "alice",
            "display_name": "Alice",
            "email": "",
            "max_buckets": "1000",
            "system": "false",
            "suspended": 1,
            "keys": [{"user": "alice", "access_key": "AK", "secret_key": "SK"}]
        }))
        .unwrap();

        assert_eq!(info.id(), "alice");
        assert_eq!(info.email, None);
        assert_eq!(info.max_buckets, Some(1000));
        assert!(!info.system);
        assert!(info.suspended);
        assert!(info.keys[0].active);
    }

    #[test]
    fn test_dashboard_user_shape() {
        let info: RgwUserInfo = serde_json::from_value(json!({
            "uid": "acme$alice",
            "user_id": "alice",
            "tenant": "acme",
            "display_name": "Alice",
            "keys": [],
            "suspended": 0
        }))
        .unwrap();

        assert_eq!(info.id(), "acme$alice");
        assert_eq!(info.tenant.as_deref(), Some("acme"));
        assert!(!info.suspended);
    }

    #[test]
    fn test_user_request_omits_absent_fields() {
        let request = RgwUserRequest {
            uid: Some("alice".into()),
            suspended: Some(0),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"uid": "alice", "suspended": 0})
        );
    }
}
