//! Session coordinator actor
//!
//! Owns the `InterceptSession` and processes push-channel signals and
//! operator requests one at a time from its inboxes. Handlers never touch
//! session state directly; they go through a cloneable `SessionHandle`.

use crate::channel::{ChannelSignal, ClientCommand};
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::models::ScopeConfig;
use crate::queue::QueueFilter;
use crate::scope::ScopeEngine;
use crate::session::{InterceptSession, SessionNotification};
use proxy_common::InterceptedRequest;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_QUEUE_SIZE: usize = 64;
const NOTIFICATION_CAPACITY: usize = 256;

/// Snapshot of the session for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// `None` until the engine reports its status after a connect
    pub enabled: Option<bool>,
    pub connected: bool,
    pub selected: Option<String>,
    pub queued: usize,
}

enum Request {
    Forward {
        id: String,
        modified: Option<String>,
        reply: oneshot::Sender<WorkbenchResult<()>>,
    },
    Drop {
        id: String,
        reply: oneshot::Sender<WorkbenchResult<()>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<WorkbenchResult<()>>,
    },
    Select {
        id: String,
        reply: oneshot::Sender<WorkbenchResult<String>>,
    },
    Toggle {
        enabled: bool,
        reply: oneshot::Sender<WorkbenchResult<()>>,
    },
    Queue {
        filter: QueueFilter,
        reply: oneshot::Sender<Vec<InterceptedRequest>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    SetScope {
        scope: ScopeEngine,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front door to the coordinator
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> WorkbenchResult<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| WorkbenchError::CoordinatorClosed)?;
        response.await.map_err(|_| WorkbenchError::CoordinatorClosed)
    }

    pub async fn forward(&self, id: &str, modified: Option<String>) -> WorkbenchResult<()> {
        let id = id.to_string();
        self.call(|reply| Request::Forward { id, modified, reply }).await?
    }

    pub async fn drop_request(&self, id: &str) -> WorkbenchResult<()> {
        let id = id.to_string();
        self.call(|reply| Request::Drop { id, reply }).await?
    }

    pub async fn remove(&self, id: &str) -> WorkbenchResult<()> {
        let id = id.to_string();
        self.call(|reply| Request::Remove { id, reply }).await?
    }

    pub async fn select(&self, id: &str) -> WorkbenchResult<String> {
        let id = id.to_string();
        self.call(|reply| Request::Select { id, reply }).await?
    }

    pub async fn toggle_intercept(&self, enabled: bool) -> WorkbenchResult<()> {
        self.call(|reply| Request::Toggle { enabled, reply }).await?
    }

    pub async fn queue(&self, filter: QueueFilter) -> WorkbenchResult<Vec<InterceptedRequest>> {
        self.call(|reply| Request::Queue { filter, reply }).await
    }

    pub async fn status(&self) -> WorkbenchResult<SessionStatus> {
        self.call(|reply| Request::Status { reply }).await
    }

    /// Compile and install a new scope policy
    pub async fn set_scope(&self, config: ScopeConfig) -> WorkbenchResult<()> {
        let scope = ScopeEngine::new(config)?;
        self.call(|reply| Request::SetScope { scope, reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }
}

pub struct Coordinator {
    session: InterceptSession,
    connected: bool,
    requests: mpsc::Receiver<Request>,
    signals: mpsc::Receiver<ChannelSignal>,
    outbound: mpsc::UnboundedSender<ClientCommand>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl Coordinator {
    /// Spawn the actor; it stops once every handle is dropped
    pub fn spawn(
        scope: ScopeEngine,
        signals: mpsc::Receiver<ChannelSignal>,
        outbound: mpsc::UnboundedSender<ClientCommand>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (request_tx, requests) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let coordinator = Self {
            session: InterceptSession::new(scope),
            connected: false,
            requests,
            signals,
            outbound,
            notifications: notifications.clone(),
        };
        let task = tokio::spawn(coordinator.run());

        (
            SessionHandle {
                requests: request_tx,
                notifications,
            },
            task,
        )
    }

    async fn run(mut self) {
        let mut channel_open = true;

        loop {
            // Upstream events already received are applied before operator requests
            tokio::select! {
                biased;

                signal = self.signals.recv(), if channel_open => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => {
                        debug!("Push channel task ended");
                        channel_open = false;
                    }
                },
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
            }
        }

        info!("Session coordinator stopped");
    }

    fn handle_signal(&mut self, signal: ChannelSignal) {
        let notifications = match signal {
            ChannelSignal::Connected => {
                self.connected = true;
                self.session.reset()
            }
            ChannelSignal::Disconnected => {
                self.connected = false;
                vec![SessionNotification::Disconnected]
            }
            ChannelSignal::Event(event) => self.session.apply(event),
        };
        self.publish(notifications);
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Forward { id, modified, reply } => {
                let result = self
                    .session
                    .forward(&id, modified.as_deref())
                    .and_then(|command| self.emit(command));
                let _ = reply.send(result);
            }
            Request::Drop { id, reply } => {
                let result = self.session.drop_request(&id).and_then(|command| self.emit(command));
                let _ = reply.send(result);
            }
            Request::Remove { id, reply } => {
                let result = self.session.remove(&id).and_then(|command| self.emit(command));
                let _ = reply.send(result);
            }
            Request::Select { id, reply } => {
                let _ = reply.send(self.session.select(&id));
            }
            Request::Toggle { enabled, reply } => {
                let command = self.session.toggle_intercept(enabled);
                let _ = reply.send(self.emit(command));
            }
            Request::Queue { filter, reply } => {
                let _ = reply.send(self.session.view(&filter));
            }
            Request::Status { reply } => {
                let _ = reply.send(SessionStatus {
                    enabled: self.session.intercept_enabled(),
                    connected: self.connected,
                    selected: self.session.selected().map(str::to_string),
                    queued: self.session.queue().len(),
                });
            }
            Request::SetScope { scope, reply } => {
                self.session.set_scope(scope);
                info!("Scope policy updated");
                let _ = reply.send(());
            }
        }
    }

    fn emit(&self, command: ClientCommand) -> WorkbenchResult<()> {
        if !self.connected {
            debug!("Push channel down, command buffered: {:?}", command);
        }
        self.outbound.send(command).map_err(|e| {
            warn!("Push channel task is gone: {}", e);
            WorkbenchError::channel("push channel closed")
        })
    }

    fn publish(&self, notifications: Vec<SessionNotification>) {
        for notification in notifications {
            // No subscribers is fine
            let _ = self.notifications.send(notification);
        }
    }
}
