//! Streaming client for the dashboard text-rewrite service.
//!
//! [`rewrite::RewriteClient`] drives one request at a time against the rewrite
//! endpoint and publishes partial output as the response streams in. Identity
//! comes from an injected [`auth::IdentityProvider`].

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod rewrite;

#[cfg(test)]
mod testing;
