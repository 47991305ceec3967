// Library entry point for fokal-core
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod models;
pub mod notify;
pub mod store;
