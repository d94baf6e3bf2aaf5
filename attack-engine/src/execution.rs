//! Intruder execution engine
//!
//! Drives one payload sweep at a time: `Idle -> Running -> (Idle | Stopped)`.
//! Cancellation is cooperative and only observed between iterations; an
//! outstanding dispatch always runs to completion and is recorded.

use crate::{
    AttackError, AttackMode, AttackModeExecutor, AttackModeFactory, AttackProgress, AttackResult,
    AttackResultData, AttackState, AttackStatistics, HttpRequestData, IntruderConfig,
    PayloadPositionParser, RequestDispatcher,
};
use futures::{future, stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Shared {
    dispatcher: Arc<dyn RequestDispatcher>,
    config: IntruderConfig,
    results: RwLock<Vec<AttackResultData>>,
    cancel: Mutex<CancellationToken>,
    progress: watch::Sender<AttackProgress>,
}

/// Payload sweep driver shared by all intruder runs of a session
#[derive(Clone)]
pub struct IntruderEngine {
    shared: Arc<Shared>,
}

impl IntruderEngine {
    pub fn new(dispatcher: Arc<dyn RequestDispatcher>, config: IntruderConfig) -> Self {
        let (progress, _) = watch::channel(AttackProgress::idle());
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                config,
                results: RwLock::new(Vec::new()),
                cancel: Mutex::new(CancellationToken::new()),
                progress,
            }),
        }
    }

    /// Validate and launch a sweep
    ///
    /// Validation happens before anything is dispatched or reset. The
    /// returned handle completes once the sweep has reached its final state.
    pub async fn start(
        &self,
        template: &str,
        payloads: Vec<String>,
        mode: AttackMode,
    ) -> AttackResult<JoinHandle<()>> {
        let points = PayloadPositionParser::parse(template);
        if points.is_empty() {
            return Err(AttackError::validation(
                "template",
                "Template must contain at least one §marker§",
            ));
        }
        if payloads.is_empty() {
            return Err(AttackError::validation("payloads", "At least one payload is required"));
        }

        let total = payloads.len();
        let token = {
            let mut cancel = self.shared.cancel.lock().await;
            let accepted = self.shared.progress.send_if_modified(|progress| {
                if progress.state == AttackState::Running {
                    return false;
                }
                *progress = AttackProgress {
                    state: AttackState::Running,
                    completed: 0,
                    total,
                };
                true
            });
            if !accepted {
                return Err(AttackError::AlreadyRunning);
            }

            self.shared.results.write().await.clear();
            *cancel = CancellationToken::new();
            cancel.clone()
        };

        info!(
            mode = ?mode,
            positions = points.len(),
            payloads = total,
            concurrency = self.shared.config.concurrency,
            "Starting intruder attack"
        );

        let shared = Arc::clone(&self.shared);
        let executor: Arc<dyn AttackModeExecutor> = Arc::from(AttackModeFactory::create(mode));
        let template = template.to_string();

        Ok(tokio::spawn(async move {
            shared.run(template, points, payloads, executor, token).await;
        }))
    }

    /// Request cancellation of the running sweep
    ///
    /// Returns whether a sweep was running.
    pub async fn stop(&self) -> bool {
        let running = self.state() == AttackState::Running;
        if running {
            info!("Stopping intruder attack");
            self.shared.cancel.lock().await.cancel();
        }
        running
    }

    pub fn state(&self) -> AttackState {
        self.shared.progress.borrow().state
    }

    pub fn progress(&self) -> AttackProgress {
        *self.shared.progress.borrow()
    }

    /// Progress snapshots, updated after every completed iteration
    pub fn subscribe_progress(&self) -> watch::Receiver<AttackProgress> {
        self.shared.progress.subscribe()
    }

    /// Results of the current or most recent sweep, in dispatch order
    pub async fn results(&self) -> Vec<AttackResultData> {
        self.shared.results.read().await.clone()
    }

    pub async fn statistics(&self) -> AttackStatistics {
        AttackStatistics::from_results(&self.shared.results.read().await)
    }
}

impl Shared {
    async fn run(
        self: Arc<Self>,
        template: String,
        points: Vec<crate::InjectionPoint>,
        payloads: Vec<String>,
        executor: Arc<dyn AttackModeExecutor>,
        token: CancellationToken,
    ) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let concurrency = self.config.concurrency.max(1);

        // Pacing sits in front of every launch but the first; `buffered`
        // keeps completions in index order whatever the concurrency
        let paced_token = token.clone();
        let launch_token = token.clone();
        let worker = Arc::clone(&self);
        let completions = stream::iter(payloads.into_iter().enumerate())
            .then(move |(i, payload)| {
                let token = paced_token.clone();
                async move {
                    if i > 0 && !delay.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    (i, payload)
                }
            })
            .take_while(move |_| future::ready(!launch_token.is_cancelled()))
            .map(move |(i, payload)| {
                let raw = executor.render(&template, &points, &payload);
                let worker = Arc::clone(&worker);
                async move { worker.execute(i + 1, payload, raw).await }
            })
            .buffered(concurrency);
        futures::pin_mut!(completions);

        while let Some(result) = completions.next().await {
            self.results.write().await.push(result);
            self.progress.send_modify(|progress| progress.completed += 1);
        }

        let final_state = if token.is_cancelled() {
            AttackState::Stopped
        } else {
            AttackState::Idle
        };
        self.progress.send_modify(|progress| progress.state = final_state);

        let progress = *self.progress.borrow();
        info!(
            state = ?final_state,
            completed = progress.completed,
            total = progress.total,
            "Intruder attack finished"
        );
    }

    /// One iteration; every failure becomes an error result
    async fn execute(&self, index: usize, payload: String, raw: String) -> AttackResultData {
        let request = match HttpRequestData::from_raw(&raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(index, payload = %payload, "Substituted request failed to parse: {}", e);
                return AttackResultData::failed(index, payload, format!("Request parse failed: {}", e), 0);
            }
        };

        debug!(index, method = %request.method, url = %request.url, "Dispatching intruder request");
        let start = Instant::now();
        let outcome = self.dispatcher.dispatch(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => AttackResultData::succeeded(index, payload, response, elapsed_ms),
            Err(e) => {
                warn!(index, payload = %payload, "Intruder request failed: {}", e);
                AttackResultData::failed(index, payload, e.to_string(), elapsed_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttackStatus, DispatchError, HttpResponseData};
    use async_trait::async_trait;
    use proxy_common::Headers;
    use tokio::sync::Semaphore;

    const TEMPLATE: &str = "GET /item/§id§ HTTP/1.1\nHost: target.test\n\n";

    /// Answers 200 with the request URL as body; URLs containing "fail" error out
    struct EchoDispatcher {
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl RequestDispatcher for EchoDispatcher {
        async fn dispatch(&self, request: HttpRequestData) -> Result<HttpResponseData, DispatchError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            if request.url.contains("fail") {
                return Err(DispatchError::transport("connection refused"));
            }
            Ok(HttpResponseData::from_bytes(
                200,
                Some("OK".to_string()),
                Headers::new(),
                request.url.as_bytes(),
            ))
        }
    }

    fn engine(request_delay_ms: u64, gate: Option<Arc<Semaphore>>) -> IntruderEngine {
        IntruderEngine::new(
            Arc::new(EchoDispatcher { gate }),
            IntruderConfig {
                request_delay_ms,
                concurrency: 1,
            },
        )
    }

    fn payloads(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_sweep_runs_to_idle() {
        let engine = engine(0, None);
        let handle = engine
            .start(TEMPLATE, payloads(&["1", "2", "3"]), AttackMode::Sniper)
            .await
            .unwrap();
        handle.await.unwrap();

        let results = engine.results().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(results[1].length, "http://target.test/item/2".len());
        assert_eq!(engine.state(), AttackState::Idle);
        assert_eq!(
            engine.progress(),
            AttackProgress {
                state: AttackState::Idle,
                completed: 3,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn test_validation_rejects_before_dispatch() {
        let engine = engine(0, None);

        let err = engine
            .start("GET / HTTP/1.1\nHost: t\n\n", payloads(&["a"]), AttackMode::Sniper)
            .await
            .unwrap_err();
        assert!(matches!(err, AttackError::Validation { ref field, .. } if field == "template"));

        let err = engine.start(TEMPLATE, Vec::new(), AttackMode::Sniper).await.unwrap_err();
        assert!(matches!(err, AttackError::Validation { ref field, .. } if field == "payloads"));

        assert_eq!(engine.state(), AttackState::Idle);
        assert!(engine.results().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_abort_sweep() {
        let engine = engine(0, None);
        let handle = engine
            .start(TEMPLATE, payloads(&["ok1", "fail", "ok2"]), AttackMode::Sniper)
            .await
            .unwrap();
        handle.await.unwrap();

        let results = engine.results().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].status, AttackStatus::Error);
        assert_eq!(results[1].length, 0);
        assert_eq!(results[2].status, AttackStatus::Code(200));

        let stats = engine.statistics().await;
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.successful_requests, 2);
    }

    #[tokio::test]
    async fn test_unparseable_substitution_records_error() {
        let engine = engine(0, None);
        let handle = engine
            .start(
                "§m§ /x HTTP/1.1\nHost: target.test\n\n",
                payloads(&["BAD:METHOD", "GET"]),
                AttackMode::Sniper,
            )
            .await
            .unwrap();
        handle.await.unwrap();

        let results = engine.results().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, AttackStatus::Error);
        assert_eq!(results[1].status, AttackStatus::Code(200));
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let engine = engine(0, Some(gate.clone()));
        let handle = engine
            .start(TEMPLATE, payloads(&["1"]), AttackMode::Sniper)
            .await
            .unwrap();

        let err = engine
            .start(TEMPLATE, payloads(&["2"]), AttackMode::Sniper)
            .await
            .unwrap_err();
        assert_eq!(err, AttackError::AlreadyRunning);

        gate.add_permits(1);
        handle.await.unwrap();
        assert_eq!(engine.results().await[0].payload, "1");
    }

    #[tokio::test]
    async fn test_stop_during_pause_keeps_completed_results() {
        // Long pacing: the sweep parks between iterations until stopped
        let engine = engine(60_000, None);
        let mut progress = engine.subscribe_progress();
        let handle = engine
            .start(TEMPLATE, payloads(&["1", "2", "3", "4"]), AttackMode::Sniper)
            .await
            .unwrap();

        progress.wait_for(|p| p.completed == 1).await.unwrap();
        assert!(engine.stop().await);
        handle.await.unwrap();

        assert_eq!(engine.results().await.len(), 1);
        assert_eq!(engine.state(), AttackState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_never_interrupts_in_flight_dispatch() {
        let gate = Arc::new(Semaphore::new(2));
        let engine = engine(0, Some(gate.clone()));
        let mut progress = engine.subscribe_progress();
        let handle = engine
            .start(TEMPLATE, payloads(&["1", "2", "3", "4", "5"]), AttackMode::Sniper)
            .await
            .unwrap();

        // Third dispatch is now blocked on the gate
        progress.wait_for(|p| p.completed == 2).await.unwrap();
        engine.stop().await;
        gate.add_permits(10);
        handle.await.unwrap();

        let results = engine.results().await;
        assert!(results.len() == 2 || results.len() == 3);
        assert!(results.iter().all(|r| r.status == AttackStatus::Code(200)));
        assert_eq!(engine.state(), AttackState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_resets_results() {
        let engine = engine(0, None);
        engine
            .start(TEMPLATE, payloads(&["1", "2"]), AttackMode::Sniper)
            .await
            .unwrap()
            .await
            .unwrap();
        engine
            .start(TEMPLATE, payloads(&["3"]), AttackMode::BatteringRam)
            .await
            .unwrap()
            .await
            .unwrap();

        let results = engine.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
        assert_eq!(results[0].payload, "3");
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let engine = engine(0, None);
        assert!(!engine.stop().await);
        assert_eq!(engine.state(), AttackState::Idle);
    }
}
