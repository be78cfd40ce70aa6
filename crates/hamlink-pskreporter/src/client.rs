//! Polling adapter for the PSKReporter retrieve API.
//!
//! One background task owns the poll loop, so at most one request is ever
//! in flight. After a successful poll the next one runs after the poll
//! interval; a `503` or any failure pushes it out to the backoff interval.
//! [`PskReporterAdapter::poll_now`] cuts the current wait short but never
//! starts a second request alongside a running one.
//!
//! Reachability is reported on change only: the first good answer after a
//! failure (or at start) emits `Connected`, the first failure after a good
//! answer emits `Disconnected`. A `503` means the service is up but rate
//! limiting, so it backs off without changing reachability.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hamlink_core::{Adapter, AdapterEvent, ConnectionState, DisconnectReason};

use crate::parser;
use crate::source::ReportSource;

/// Broadcast channel capacity for event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

const SERVICE_UNAVAILABLE: u16 = 503;

/// Poll scheduling.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Wait after a successful poll.
    pub poll_interval: Duration,
    /// Wait after a `503` or a failed poll.
    pub backoff_interval: Duration,
}

/// What one poll came to.
#[derive(Debug)]
enum PollOutcome {
    Reports(usize),
    RateLimited,
    Failed(String),
}

struct Shared {
    source: Arc<dyn ReportSource>,
    options: PollOptions,
    events: broadcast::Sender<AdapterEvent>,
    state: watch::Sender<ConnectionState>,
    wake: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: AdapterEvent) {
        if !self.is_closed() {
            let _ = self.events.send(event);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if self.is_closed() {
            return;
        }
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn reachable(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    async fn poll_once(&self) -> PollOutcome {
        tracing::debug!(source = %self.source.describe(), "Polling PSKReporter");
        let response = match self.source.fetch().await {
            Ok(r) => r,
            Err(e) => return PollOutcome::Failed(e.to_string()),
        };
        match response.status {
            200 => {
                let reports = parser::parse_reports(&response.body);
                let count = reports.len();
                tracing::debug!(count, "PSKReporter poll succeeded");
                if !self.reachable() {
                    self.set_state(ConnectionState::Connected);
                    self.emit(AdapterEvent::Connected {
                        peer: self.source.describe(),
                        detail: None,
                    });
                }
                self.emit(AdapterEvent::Reports(reports));
                PollOutcome::Reports(count)
            }
            SERVICE_UNAVAILABLE => PollOutcome::RateLimited,
            status => PollOutcome::Failed(format!("HTTP status {status}")),
        }
    }

    /// Apply an outcome and return the wait before the next poll.
    fn settle(&self, outcome: PollOutcome) -> Duration {
        match outcome {
            PollOutcome::Reports(_) => self.options.poll_interval,
            PollOutcome::RateLimited => {
                tracing::warn!(
                    backoff_secs = self.options.backoff_interval.as_secs(),
                    "PSKReporter is rate limiting, backing off"
                );
                self.options.backoff_interval
            }
            PollOutcome::Failed(message) => {
                tracing::warn!(error = %message, "PSKReporter poll failed");
                if self.reachable() {
                    self.emit(AdapterEvent::Disconnected {
                        reason: DisconnectReason::Error,
                    });
                }
                self.set_state(ConnectionState::Connecting);
                self.emit(AdapterEvent::Error(format!("PSKReporter poll failed: {message}")));
                self.options.backoff_interval
            }
        }
    }
}

/// Reception report feed poller.
pub struct PskReporterAdapter {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PskReporterAdapter {
    /// Start polling. The first poll runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(source: Arc<dyn ReportSource>, options: PollOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            source,
            options,
            events,
            state,
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(Arc::clone(&shared), cancel.clone()));
        PskReporterAdapter {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// End the current wait and poll as soon as no request is in flight.
    pub fn poll_now(&self) {
        if !self.shared.is_closed() {
            self.shared.wake.notify_one();
        }
    }

    /// The scheduling this adapter was started with.
    pub fn options(&self) -> PollOptions {
        self.shared.options
    }
}

#[async_trait]
impl Adapter for PskReporterAdapter {
    fn name(&self) -> &str {
        "pskreporter"
    }

    fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.shared.events.subscribe()
    }

    async fn disconnect(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let was_reachable = self.shared.reachable();
        self.shared.state.send_replace(ConnectionState::Disconnected);
        if was_reachable {
            let _ = self.shared.events.send(AdapterEvent::Disconnected {
                reason: DisconnectReason::Requested,
            });
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        tracing::debug!(source = %self.shared.source.describe(), "PSKReporter poller stopped");
    }
}

impl Drop for PskReporterAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            o = shared.poll_once() => o,
        };
        let delay = shared.settle(outcome);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = shared.wake.notified() => {
                tracing::debug!("Early PSKReporter poll requested");
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchResponse;
    use hamlink_core::error::{Error, Result};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    const ONE_REPORT: &str = r#"<receptionReports>
<receptionReport receiverCallsign="N0RX" senderCallsign="K1ABC" frequency="14236000" mode="FREEDV" sNR="2" />
</receptionReports>"#;

    #[derive(Clone, Copy)]
    enum Reply {
        Status(u16, &'static str),
        Refused,
    }

    /// Hands out scripted replies; repeats the last one when the script ends.
    struct ScriptedSource {
        script: std::sync::Mutex<VecDeque<Reply>>,
        last: std::sync::Mutex<Reply>,
        latency: Duration,
        calls: AtomicU32,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: &[Reply], latency: Duration) -> Arc<Self> {
            Arc::new(ScriptedSource {
                script: std::sync::Mutex::new(script.iter().copied().collect()),
                last: std::sync::Mutex::new(Reply::Status(200, "")),
                latency,
                calls: AtomicU32::new(0),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReportSource for ScriptedSource {
        async fn fetch(&self) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let reply = {
                let mut script = self.script.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                if let Some(next) = script.pop_front() {
                    *last = next;
                }
                *last
            };
            match reply {
                Reply::Status(status, body) => Ok(FetchResponse {
                    status,
                    body: body.to_string(),
                }),
                Reply::Refused => Err(Error::Http("connection refused".into())),
            }
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    const OPTIONS: PollOptions = PollOptions {
        poll_interval: Duration::from_secs(300),
        backoff_interval: Duration::from_secs(900),
    };

    fn drain(rx: &mut broadcast::Receiver<AdapterEvent>) -> Vec<AdapterEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn success_reports_and_waits_poll_interval() {
        let source = ScriptedSource::new(&[Reply::Status(200, ONE_REPORT)], Duration::ZERO);
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        let mut events = psk.subscribe();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(psk.connection_state(), ConnectionState::Connected);

        advance(298).await;
        assert_eq!(source.calls(), 1);
        advance(3).await;
        assert_eq!(source.calls(), 2);

        // Reachability did not change, so only the first poll says Connected.
        let evs = drain(&mut events);
        let connected = evs
            .iter()
            .filter(|e| matches!(e, AdapterEvent::Connected { .. }))
            .count();
        assert_eq!(connected, 1);
        assert!(matches!(evs.last(), Some(AdapterEvent::Reports(r)) if r.len() == 1));
        psk.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_emits_connected_then_reports() {
        let source = ScriptedSource::new(&[Reply::Status(200, ONE_REPORT)], Duration::from_secs(1));
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        let mut events = psk.subscribe();
        advance(2).await;

        let evs = drain(&mut events);
        assert_eq!(evs.len(), 2, "{evs:?}");
        assert!(matches!(&evs[0], AdapterEvent::Connected { peer, .. } if peer == "scripted"));
        match &evs[1] {
            AdapterEvent::Reports(r) => {
                assert_eq!(r.len(), 1);
                assert_eq!(r[0].sender_callsign, "K1ABC");
            }
            other => panic!("expected Reports, got {other:?}"),
        }
        psk.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn service_unavailable_backs_off_without_status_change() {
        let source = ScriptedSource::new(
            &[Reply::Status(200, ""), Reply::Status(503, "busy")],
            Duration::ZERO,
        );
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        let mut events = psk.subscribe();
        advance(301).await;
        assert_eq!(source.calls(), 2);

        advance(898).await;
        assert_eq!(source.calls(), 2);
        advance(3).await;
        assert_eq!(source.calls(), 3);

        assert_eq!(psk.connection_state(), ConnectionState::Connected);
        let evs = drain(&mut events);
        assert!(evs.iter().all(|e| !matches!(
            e,
            AdapterEvent::Disconnected { .. } | AdapterEvent::Error(_)
        )));
        psk.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_changes_are_reported_once() {
        let source = ScriptedSource::new(
            &[
                Reply::Status(200, ""),
                Reply::Refused,
                Reply::Status(500, "oops"),
                Reply::Status(200, ""),
            ],
            Duration::ZERO,
        );
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        let mut events = psk.subscribe();

        // 0 s ok, 300 s refused, 1200 s 500, 2100 s ok.
        advance(2101).await;
        assert_eq!(source.calls(), 4);

        let status: Vec<AdapterEvent> = drain(&mut events)
            .into_iter()
            .filter(|e| {
                matches!(e, AdapterEvent::Connected { .. } | AdapterEvent::Disconnected { .. })
            })
            .collect();
        assert_eq!(status.len(), 3, "{status:?}");
        assert!(matches!(&status[0], AdapterEvent::Connected { .. }));
        assert!(matches!(
            &status[1],
            AdapterEvent::Disconnected { reason: DisconnectReason::Error }
        ));
        assert!(matches!(&status[2], AdapterEvent::Connected { .. }));
        psk.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_now_is_single_flight() {
        let source = ScriptedSource::new(&[], Duration::from_secs(5));
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        tokio::time::sleep(Duration::from_millis(1)).await;

        for _ in 0..10 {
            psk.poll_now();
        }
        advance(20).await;
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        // The running poll plus one early follow-up.
        assert_eq!(source.calls(), 2);

        psk.poll_now();
        advance(6).await;
        assert_eq!(source.calls(), 3);
        psk.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_polling() {
        let source = ScriptedSource::new(&[], Duration::ZERO);
        let psk = PskReporterAdapter::start(source.clone(), OPTIONS);
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut events = psk.subscribe();

        psk.disconnect().await;
        psk.disconnect().await;
        assert_eq!(psk.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            drain(&mut events).as_slice(),
            [AdapterEvent::Disconnected { reason: DisconnectReason::Requested }]
        ));

        psk.poll_now();
        advance(3600).await;
        assert_eq!(source.calls(), 1);
    }
}
