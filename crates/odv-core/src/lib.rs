//! Core types, configuration and collaborator contracts shared by every
//! ODV back-office crate.

pub mod config;
pub mod notify;
pub mod types;

pub use config::*;
pub use notify::{NoopNotifier, Notifier, NotifyError};
pub use types::*;
