//! Socialnet Backend Library
//!
//! Access-control pipeline for the social network REST API: admission
//! control, bearer-token verification, cached identity resolution and
//! role-based authorization. Exposed as a library for the binary and tests.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod middleware;
pub mod store;

pub use api::{build_router, AppState};
pub use config::Config;
