pub mod config;
pub mod error;
pub mod models;
pub mod openrouter;
pub mod prompt;
pub mod rate_limit;
pub mod routes;

pub use routes::{build_router, AppState};
