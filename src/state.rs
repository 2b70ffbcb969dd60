use std::sync::Arc;

use crate::PgPool;
use crate::config::Config;
use crate::services::htp::HtpPipeline;

// --- Shared application state ---
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub pipeline: Arc<HtpPipeline>,
}
