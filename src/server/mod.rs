/// Control API: the JSON/HTTP transport wrapping the DNS Manager and
/// Certificate Manager.
pub mod api;
pub mod auth;
pub mod health;

pub use api::{AppState, build_router, start_server};
pub use health::HealthCheck;
