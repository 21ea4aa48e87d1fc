//! API module - HTTP routes, handlers and bodies

pub mod handlers;
pub mod routes;
pub mod types;
