//! Intercept session state machine
//!
//! Pure state: every transition returns the notifications to publish and,
//! for operator actions, the command to send upstream. The coordinator owns
//! the only instance and applies inputs one at a time.

use crate::channel::{ClientCommand, ServerEvent};
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::queue::{InterceptQueue, QueueFilter};
use crate::scope::ScopeEngine;
use attack_engine::HttpRequestData;
use proxy_common::InterceptedRequest;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Change observers are told about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotification {
    Added { request: InterceptedRequest },
    Removed { id: String },
    SelectionCleared,
    InterceptStatus { enabled: bool },
    /// Queue discarded after a (re)connect; the engine re-pushes its state
    Reset,
    Disconnected,
}

#[derive(Debug)]
pub struct InterceptSession {
    scope: ScopeEngine,
    queue: InterceptQueue,
    selected: Option<String>,
    /// `None` until the engine reports its status
    intercept_enabled: Option<bool>,
}

impl InterceptSession {
    pub fn new(scope: ScopeEngine) -> Self {
        Self {
            scope,
            queue: InterceptQueue::new(),
            selected: None,
            intercept_enabled: None,
        }
    }

    pub fn apply(&mut self, event: ServerEvent) -> Vec<SessionNotification> {
        match event {
            ServerEvent::Intercepted { data } => {
                if !self.scope.admits(&data.url) {
                    debug!(request_id = %data.id, url = %data.url, "Out-of-scope request discarded");
                    return Vec::new();
                }
                if !self.queue.push(data.clone()) {
                    warn!(request_id = %data.id, "Duplicate intercepted id ignored");
                    return Vec::new();
                }
                debug!(request_id = %data.id, method = %data.method, url = %data.url, "Request queued");
                vec![SessionNotification::Added { request: data }]
            }
            ServerEvent::InterceptStatus { enabled } => {
                self.intercept_enabled = Some(enabled);
                vec![SessionNotification::InterceptStatus { enabled }]
            }
            ServerEvent::Removed { id } => {
                let mut notifications = Vec::new();
                if self.queue.remove(&id).is_some() {
                    notifications.push(SessionNotification::Removed { id: id.clone() });
                }
                if self.selected.as_deref() == Some(id.as_str()) {
                    self.selected = None;
                    notifications.push(SessionNotification::SelectionCleared);
                }
                notifications
            }
            ServerEvent::Forwarded { id } => {
                info!(request_id = %id, "Forward acknowledged");
                Vec::new()
            }
            ServerEvent::Dropped { id } => {
                info!(request_id = %id, "Drop acknowledged");
                Vec::new()
            }
        }
    }

    /// Forget everything learned from the previous connection
    pub fn reset(&mut self) -> Vec<SessionNotification> {
        self.queue.clear();
        self.selected = None;
        self.intercept_enabled = None;
        vec![SessionNotification::Reset]
    }

    /// Forward command; the entry stays queued until the engine removes it
    ///
    /// `modified` is operator-edited raw text, re-parsed into a structured
    /// request.
    pub fn forward(&self, id: &str, modified: Option<&str>) -> WorkbenchResult<ClientCommand> {
        self.require(id)?;
        let modified = modified.map(HttpRequestData::from_raw).transpose()?;
        Ok(ClientCommand::Forward {
            id: id.to_string(),
            modified,
        })
    }

    pub fn drop_request(&self, id: &str) -> WorkbenchResult<ClientCommand> {
        self.require(id)?;
        Ok(ClientCommand::Drop { id: id.to_string() })
    }

    /// Remove command; local removal waits for the `removed` event
    pub fn remove(&self, id: &str) -> WorkbenchResult<ClientCommand> {
        self.require(id)?;
        Ok(ClientCommand::Remove { id: id.to_string() })
    }

    /// The local flag only changes on the engine's acknowledgement
    pub fn toggle_intercept(&self, enabled: bool) -> ClientCommand {
        ClientCommand::ToggleIntercept { enabled }
    }

    /// Select an entry and return its editable raw text
    pub fn select(&mut self, id: &str) -> WorkbenchResult<String> {
        let raw = self.require(id)?.format();
        self.selected = Some(id.to_string());
        Ok(raw)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn intercept_enabled(&self) -> Option<bool> {
        self.intercept_enabled
    }

    pub fn queue(&self) -> &InterceptQueue {
        &self.queue
    }

    pub fn view(&self, filter: &QueueFilter) -> Vec<InterceptedRequest> {
        self.queue.view(filter).cloned().collect()
    }

    /// Applies to future admissions only
    pub fn set_scope(&mut self, scope: ScopeEngine) {
        self.scope = scope;
    }

    pub fn scope(&self) -> &ScopeEngine {
        &self.scope
    }

    fn require(&self, id: &str) -> WorkbenchResult<&InterceptedRequest> {
        self.queue.get(id).ok_or_else(|| WorkbenchError::unknown_request(id))
    }
}
