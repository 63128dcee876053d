use std::sync::Arc;
use std::time::Instant;

use th_domain::config::Config;
use tokio_util::sync::CancellationToken;

use crate::nodes::router::Router;
use crate::nodes::transport::ConnectionHub;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Routing core: registry, index, correlator, notifier.
    pub router: Arc<Router>,
    /// Live WebSocket connections; attached to the router as its transport.
    pub hub: Arc<ConnectionHub>,
    /// Cancelled once on process shutdown; stops the monitor and socket loops.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}
