//! `Taskline` functions service library.
//!
//! Hosts the serverless-style proxies the client calls: the authenticate
//! dispatcher, the 2FA code endpoints, and the user directory. Exposes the
//! server for use in tests and embedding; every handler talks to the
//! hosted platform through an API-key [`admin::AdminClient`].

pub mod admin;
pub mod config;
pub mod mailer;
pub mod server;
pub mod twofa;
