//! Client library for Taskline: backend bindings, session facade, user
//! directory, live task sync, and deadline alerts.

pub mod api;
pub mod cache;
pub mod config;
pub mod directory;
pub mod notify;
pub mod session;
pub mod sync;
