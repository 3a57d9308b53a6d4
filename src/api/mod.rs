//! taxscan HTTP API
//! REST endpoints over the scanner: source, bytecode, address and batch scans

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use middleware::start_cleanup_task;
pub use routes::create_router;
pub use types::*;
