//! Domain layer - controller contract and shared value objects
//!
//! The ports define the boundary between the host runtime and the resource
//! controllers; capabilities and diagnostics are shared by all of them.

pub mod caps;
pub mod diagnostics;
pub mod ports;
pub mod value;

pub use caps::*;
pub use diagnostics::*;
pub use ports::*;
pub use value::*;
