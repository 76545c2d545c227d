//! Request handlers.
//!
//! Handlers that read a JSON body take it as raw [`Bytes`](axum::body::Bytes)
//! and hand it to the validator chain, so an empty body parses as an empty
//! login request instead of failing extraction.

pub mod about;
pub mod admin;
pub mod email;
pub mod oauth2;
pub mod otp;
pub mod password;
pub mod passwordless;
pub mod session;
pub mod signin;
pub mod signup;
pub mod tokens;
pub mod users;
