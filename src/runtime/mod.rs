//! Host driver
//!
//! A strictly sequential stand-in for the host runtime: a YAML manifest of
//! desired resources, a JSON state file, and an engine that calls the
//! controllers in declaration order.

pub mod dispatch;
pub mod engine;
pub mod manifest;
pub mod state;

pub use dispatch::{controller_for, DynController, Outcome, Planned};
pub use engine::{Action, Engine, Report};
pub use manifest::{Address, Manifest, ResourceDecl};
pub use state::{StateFile, StateStore};
