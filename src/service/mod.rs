pub mod grpc;
pub mod http;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::EngineHandle;

/// Shared state handed to both bridges: a clone of the [`EngineHandle`] and
/// the resolved process configuration (for request-time caps).
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub config: Arc<AppConfig>,
}
