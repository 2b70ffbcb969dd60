pub mod auth;
pub mod config;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod state;

use deadpool_diesel::postgres::Pool as DeadpoolPool;

// Define PgPool type alias here for library-wide use
pub type PgPool = DeadpoolPool;

// Re-export AppState for convenience if needed elsewhere
pub use state::AppState;

pub mod test_helpers;
