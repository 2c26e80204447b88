//! Application runtime composition modules.

pub(crate) mod config;
pub(crate) mod exit_handler;
pub(crate) mod history;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod terminal;
