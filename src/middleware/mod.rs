//! Middleware module - Authentication, rate limiting and CORS

pub mod auth;
pub mod cors;
pub mod rate_limit;
