// src/security/mod.rs - Trust boundary and local-action guards

pub mod blocklist;
pub mod confine;
pub mod gate;

pub use blocklist::CommandBlocklist;
pub use confine::AllowedRoot;
pub use gate::{Authorization, SecurityGate};
