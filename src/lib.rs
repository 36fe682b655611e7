//! Ceph Reconciler - desired-state management over the Ceph Manager REST API
//!
//! Projects a declarative inventory of Ceph cluster objects (cephx
//! identities, configuration settings, manager modules, RGW users, keys and
//! buckets, pools, CRUSH rules, erasure-code profiles) onto the Ceph Manager
//! REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                   Host Driver (runtime, main.rs)                     │
//! │        manifest (YAML) ─── engine ─── state file (JSON)             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Provider Shell                                │
//! │          validates provider config, builds one client               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐   │
//! │  │   auth   │ │  config  │ │   mgr    │ │   rgw    │ │   pool   │   │
//! │  │          │ │          │ │ modules  │ │ users,   │ │ crush,   │   │
//! │  │          │ │          │ │          │ │ keys,    │ │ ec       │   │
//! │  │          │ │          │ │          │ │ buckets  │ │ profiles │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────┘ └──────────┘   │
//! │        Resource Controllers  +  reconcile (diff, rollback, drift)    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │        REST Client (probing, token session, versioned Accept)        │
//! │                     Keyring Codec (cephx)                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: Ceph Manager REST client and typed endpoints
//! - [`controllers`]: One resource controller per managed kind
//! - [`domain`]: Controller contract, capabilities and diagnostics
//! - [`error`]: Error types and handling
//! - [`keyring`]: Cephx keyring parse/render
//! - [`provider`]: Provider configuration and shared client
//! - [`reconcile`]: Keyed diff, rollback log, drift and import helpers
//! - [`runtime`]: Manifest, state file and sequential engine

pub mod client;
pub mod controllers;
pub mod domain;
pub mod error;
pub mod keyring;
pub mod provider;
pub mod reconcile;
pub mod runtime;

// Re-export commonly used types
pub use client::{CephClient, ClientConfig, Credentials};

pub use controllers::{
    AuthController, AuthIdentity,
    ClusterConfig, ClusterConfigController,
    CrushRule, CrushRuleController,
    ErasureCodeProfile, ErasureCodeProfileController,
    MgrModule, MgrModuleController,
    MgrModuleConfig, MgrModuleConfigController,
    Pool, PoolController, PoolType,
    RgwBucket, RgwBucketController,
    RgwS3Key, RgwS3KeyController,
    RgwUser, RgwUserController,
};

pub use domain::{
    Applied, AttrPath, Capabilities, Diagnostic, Diagnostics, OpContext, ResourceController,
    ResourceKind, Severity,
};

pub use error::{Error, ErrorKind, Result};

pub use keyring::{KeyringEntry, KeyringError};

pub use provider::{Provider, ProviderConfig};

pub use runtime::{Action, Address, Engine, Manifest, Report, StateStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
