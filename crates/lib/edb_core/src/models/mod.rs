//! Domain models.

pub mod auth;
pub mod mail;
