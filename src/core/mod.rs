// src/core/mod.rs - Command dispatch engine

pub mod command;
pub mod dispatcher;
pub mod reply;
pub mod router;

pub use command::{classify, ClassifyError, Command};
pub use dispatcher::{DispatchOptions, Dispatcher, Outcome};
pub use reply::{Reply, ReplyItem, ReplySink};
pub use router::{ActionRouter, Route, RouterSettings};
