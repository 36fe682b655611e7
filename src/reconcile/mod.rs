//! Reconciliation primitives shared by the controllers

pub mod diff;
pub mod drift;
pub mod import;
pub mod rollback;

pub use diff::{diff, flatten, group, CellKey, KeyedDiff};
pub use drift::DriftAction;
pub use rollback::{RollbackLog, Unwound};
