//! HTTP surface of the funnel.

pub mod routes;

pub use routes::{AppState, funnel_routes};
