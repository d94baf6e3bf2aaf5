//! Intercept workbench control plane
//!
//! Connects to the capture engine's push channel, keeps the intercept queue
//! for the operator, and serves the REST API that drives the queue, the
//! scope policy, the repeater and the intruder.

pub mod api;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod scope;
pub mod session;

pub use api::AppState;
pub use channel::{ChannelSignal, ClientCommand, PushChannel, PushConnector, ServerEvent, WsConnector};
pub use config::WorkbenchConfig;
pub use coordinator::{Coordinator, SessionHandle, SessionStatus};
pub use database::Database;
pub use error::{WorkbenchError, WorkbenchResult};
pub use logging::{init_logging, LoggingConfig};
pub use models::ScopeConfig;
pub use queue::{InterceptQueue, MethodFilter, QueueFilter};
pub use scope::ScopeEngine;
pub use session::{InterceptSession, SessionNotification};

use attack_engine::{IntruderEngine, ReqwestDispatcher, Repeater, RequestDispatcher};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SIGNAL_BUFFER: usize = 256;

/// Fully wired workbench, ready to start
pub struct Workbench {
    config: WorkbenchConfig,
    state: AppState,
    signals: mpsc::Sender<ChannelSignal>,
    outbound: mpsc::UnboundedReceiver<ClientCommand>,
    shutdown: CancellationToken,
}

impl Workbench {
    /// Open the database, restore the saved scope and spawn the session
    /// coordinator
    pub async fn new(config: WorkbenchConfig) -> WorkbenchResult<Self> {
        config.validate()?;

        let database = Database::new(&config.database_url).await?;
        let scope_config = database.load_scope().await?.unwrap_or_default();
        let scope = ScopeEngine::new(scope_config)?;

        let dispatcher: Arc<dyn RequestDispatcher> = Arc::new(
            ReqwestDispatcher::new(config.dispatch_timeout())
                .map_err(|e| WorkbenchError::configuration(format!("HTTP client: {}", e)))?,
        );
        let repeater = Repeater::new(Arc::clone(&dispatcher));
        let intruder = IntruderEngine::new(dispatcher, config.intruder.clone());

        let (signals, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (session, _coordinator) = Coordinator::spawn(scope, signal_rx, outbound_tx);

        Ok(Self {
            config,
            state: AppState {
                session,
                database,
                repeater,
                intruder,
            },
            signals,
            outbound,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.state.session
    }

    /// Cancelling this token stops the push channel and the API server
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Run the push channel and the API server until shutdown
    pub async fn start(self) -> WorkbenchResult<()> {
        let channel = PushChannel::new(
            WsConnector::new(self.config.engine_url.clone()),
            self.config.reconnect_delay(),
        );
        let channel_task = tokio::spawn(channel.run(self.signals, self.outbound, self.shutdown.clone()));

        let app = api::router(self.state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = TcpListener::bind(addr).await?;
        info!("REST API listening on http://{}", addr);
        info!("Capture engine push channel: {}", self.config.engine_url);

        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        // A server error also takes the push channel down
        self.shutdown.cancel();
        self.state.intruder.stop().await;
        if let Err(e) = channel_task.await {
            warn!("Push channel task failed: {}", e);
        }

        served?;
        info!("Workbench stopped");
        Ok(())
    }
}
