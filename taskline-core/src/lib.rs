//! Shared domain and wire types for `Taskline`.

pub mod deadline;
pub mod document;
pub mod filter;
pub mod proxy;
pub mod stats;
pub mod stream;
pub mod task;
pub mod user;
