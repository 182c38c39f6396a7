// src/actions/mod.rs - Local actions behind the router

pub mod files;
pub mod history;
pub mod proposal;
pub mod screen;
pub mod shell;
pub mod status;

pub use files::FileAccess;
pub use proposal::PendingAction;
pub use screen::{OsScreenCapture, ScreenCapture};
pub use shell::{OsShell, ShellExecutor, ShellOutput};
