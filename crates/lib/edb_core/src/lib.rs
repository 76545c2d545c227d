//! # edb_core
//!
//! Core auth domain logic for EDB: token lifecycle, one-time passcodes,
//! session payloads, CSRF tokens, the request validator chain and
//! rule-based access control. Transport-agnostic; `edb_api` wires it
//! into HTTP.

pub mod access;
pub mod auth;
pub mod cache;
pub mod mail;
pub mod models;
pub mod users;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
