// src/lib.rs - Library root for deskrelay

pub mod actions;
pub mod cli;
pub mod core;
pub mod infra;
pub mod integrations;
pub mod provider;
pub mod security;
pub mod session;
pub mod util;
