//! Request middleware.

pub mod auth;
pub mod csrf;
pub mod rbac;
pub mod session;
