//! Viewer-side synchronization controller
//!
//! Maintains one viewer's belief about the shared playback state and keeps a
//! playback engine in step with it. The controller polls on a fixed interval,
//! measures round-trip time, and reconciles every accepted response into
//! playback instructions; command entry points (`play`, `pause`, `seek`)
//! additionally poll immediately and fire optimistic events predicting the
//! outcome before the round trip completes.
//!
//! Concurrency model: one poll-loop task; polls are spawned per tick and may
//! overlap when the round trip exceeds the interval (stale responses are
//! filtered by the ordering guard, not prevented from being sent). At most
//! one scheduled play/pause transition is live; a newer state change aborts
//! and replaces it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use watchsync_core::model::{SessionDocument, ViewerReport, DEFAULT_POLL_INTERVAL};
use watchsync_core::protocol::{Command, PollRequest};

use crate::events::PlaybackEvent;
use crate::transport::{SyncTransport, TransportError};

/// Video synchronization controller
///
/// `stop()` should be called once before discarding the controller; it
/// cancels the poll loop and any pending scheduled transition.
pub struct SyncClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn SyncTransport>,
    viewer_id: String,
    poll_interval: Duration,
    events: broadcast::Sender<PlaybackEvent>,
    state: Mutex<State>,
}

/// Mutable controller state, shared between the public API and poll tasks
struct State {
    /// This viewer's state as reported to the server on every poll
    report: ViewerReport,

    /// The most recently accepted authoritative document
    last_document: Option<SessionDocument>,

    /// Poll loop task
    poll_task: Option<JoinHandle<()>>,

    /// Pending scheduled play/pause transition, if any
    transition_task: Option<JoinHandle<()>>,

    /// Set once the server signals a session-level failure; no further
    /// polls or reconciliations happen afterwards
    fatal: bool,
}

impl SyncClient {
    /// Create a controller with the default poll interval
    ///
    /// A random viewer id is generated; uniqueness is best-effort.
    pub fn new<T: SyncTransport>(transport: T) -> Self {
        Self::with_poll_interval(transport, Duration::from_secs_f64(DEFAULT_POLL_INTERVAL))
    }

    /// Create a controller polling at a custom interval
    pub fn with_poll_interval<T: SyncTransport>(transport: T, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        let report = ViewerReport {
            poll_interval: poll_interval.as_secs_f64(),
            ..ViewerReport::default()
        };

        Self {
            inner: Arc::new(Inner {
                transport: Box::new(transport),
                viewer_id: uuid::Uuid::new_v4().to_string(),
                poll_interval,
                events,
                state: Mutex::new(State {
                    report,
                    last_document: None,
                    poll_task: None,
                    transition_task: None,
                    fatal: false,
                }),
            }),
        }
    }

    /// This viewer's id as sent to the server
    pub fn viewer_id(&self) -> &str {
        &self.inner.viewer_id
    }

    /// Subscribe to playback instructions
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Start the poll loop. Call once to begin synchronization.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        if state.poll_task.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        state.poll_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if inner.state.lock().await.fatal {
                    tracing::info!("Stopping poll loop after fatal session error");
                    break;
                }
                // Fire-and-forget so a slow round trip never delays the next
                // scheduled poll
                inner.clone().spawn_poll(Command::None);
            }
        }));
    }

    /// Stop polling and cancel any pending scheduled transition
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        if let Some(task) = state.transition_task.take() {
            task.abort();
        }
    }

    /// The video is buffered and ready to play
    pub async fn ready(&self) {
        self.inner.state.lock().await.report.ready = true;
    }

    /// The playback engine stalled (buffering) at the given position
    pub async fn busy(&self, time: f64) {
        let was_ready = {
            let mut state = self.inner.state.lock().await;
            std::mem::replace(&mut state.report.ready, false)
        };
        // A previously-ready viewer going busy re-seeks, pausing everyone
        // until this viewer catches up again
        if was_ready {
            self.inner.seek(time).await;
        }
    }

    /// Request playback starting at the given position
    pub async fn play(&self, time: f64) {
        self.inner.play(time);
    }

    /// Request a pause at the given position
    pub async fn pause(&self, time: f64) {
        self.inner.pause(time);
    }

    /// Move the playhead, preserving the current logical play state
    pub async fn seek(&self, time: f64) {
        self.inner.seek(time).await;
    }
}

impl Inner {
    fn emit(&self, event: PlaybackEvent) {
        // No subscriber is fine; the engine may attach late
        let _ = self.events.send(event);
    }

    /// Spawn one poll as a detached task. Boxed so command polls issued from
    /// within a poll's own reconciliation don't make the future type
    /// recursive.
    fn spawn_poll(self: Arc<Self>, command: Command) {
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> =
            Box::pin(async move { self.poll_once(command).await });
        tokio::spawn(fut);
    }

    /// Send one poll and reconcile its response
    async fn poll_once(self: &Arc<Self>, command: Command) {
        let request = {
            let state = self.state.lock().await;
            if state.fatal {
                return;
            }
            PollRequest {
                viewer_id: self.viewer_id.clone(),
                report: state.report.clone(),
                command,
            }
        };

        let started = Instant::now();
        match self.transport.poll(&request).await {
            Ok(document) => {
                let round_trip = started.elapsed().as_secs_f64();
                if let Some(target) = self.apply_response(document, round_trip).await {
                    // Video changed: re-seek so everyone (including us)
                    // converges on the catch-up position
                    self.seek(target).await;
                }
            }
            Err(TransportError::Session(message)) => {
                tracing::error!("Fatal session error: {}", message);
                self.state.lock().await.fatal = true;
                self.emit(PlaybackEvent::FatalError(message));
            }
            Err(e) => {
                // Transient; the next scheduled tick is the retry
                tracing::warn!("Poll failed: {}", e);
            }
        }
    }

    /// Reconcile one authoritative document into local playback instructions.
    ///
    /// Returns the catch-up seek position when the video URL changed.
    async fn apply_response(
        self: &Arc<Self>,
        document: SessionDocument,
        round_trip: f64,
    ) -> Option<f64> {
        let mut state = self.state.lock().await;

        // Ordering guard: the transport gives no ordering promises, so drop
        // anything not strictly newer than what we've already applied.
        if let Some(last) = &state.last_document {
            if document.time <= last.time {
                tracing::warn!(
                    response_time = document.time,
                    applied_time = last.time,
                    "Got a server response out of order, discarding"
                );
                return None;
            }
        }
        let previous = state.last_document.replace(document.clone());

        // Freshest measurement wins; the server uses this to schedule fair
        // playback starts
        state.report.round_trip_time = round_trip;

        let previous_count = previous.as_ref().map_or(0, |d| d.viewers.len());
        if document.viewers.len() != previous_count {
            self.emit(PlaybackEvent::ViewerCountChanged(
                document.viewers.len().saturating_sub(1),
            ));
        }

        // A pending barrier means someone requested playback and the session
        // is waiting for everyone to be ready
        let previous_pending = previous.as_ref().is_some_and(|d| d.video_play_on_all_ready);
        if document.video_play_on_all_ready != previous_pending {
            if document.video_play_on_all_ready {
                self.emit(PlaybackEvent::Busy);
            } else if state.report.ready {
                self.emit(PlaybackEvent::Ready);
            }
        }

        let previous_playing = previous.as_ref().is_some_and(|d| d.logically_playing());
        if document.logically_playing() != previous_playing {
            self.emit(if document.logically_playing() {
                PlaybackEvent::PlayingBegan
            } else {
                PlaybackEvent::PlayingEnded
            });
        }

        let previous_url = previous.as_ref().and_then(|d| d.video_url.clone());
        if document.video_url != previous_url {
            // Joining (or switching video): seek to wherever the others are
            // by now, accounting for time already played since the last
            // transition plus half our round trip
            let elapsed = (document.time - document.state_change_time) + round_trip / 2.0;
            let target = if elapsed > 0.0 && document.video_playing {
                document.video_time + elapsed
            } else {
                document.video_time
            };
            self.emit(PlaybackEvent::VideoUrlChanged(document.video_url.clone()));
            return Some(target);
        }

        let changed = previous
            .as_ref()
            .map_or(true, |d| d.state_change_time != document.state_change_time);
        if changed {
            // Estimate the server clock and schedule the transition for the
            // moment the server intended, shared by every viewer.
            // TODO: refine the estimate across polls instead of guessing from
            // a single round trip each time.
            let server_time_estimate = document.time + round_trip / 2.0;
            let delta = document.state_change_time - server_time_estimate;
            self.schedule_transition(&mut state, delta, document.video_playing);

            // The playhead position is known now, not at fire time
            self.emit(PlaybackEvent::SeekTo(document.video_time));

            // Echo the observed change so the server can see we've caught up
            state.report.state_change_time = document.state_change_time;
        }

        None
    }

    /// Apply the server's play/pause state `delta` seconds in the future,
    /// replacing any pending transition
    fn schedule_transition(self: &Arc<Self>, state: &mut State, delta: f64, playing: bool) {
        if let Some(task) = state.transition_task.take() {
            task.abort();
        }

        // Show the spinner while the synchronized start is pending
        if playing {
            self.emit(PlaybackEvent::Busy);
        }

        if delta <= 0.0 {
            // Was supposed to happen now or in the past
            self.fire_transition(playing);
        } else {
            let inner = Arc::clone(self);
            state.transition_task = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(delta)).await;
                inner.state.lock().await.transition_task = None;
                inner.fire_transition(playing);
            }));
        }
    }

    fn fire_transition(&self, playing: bool) {
        if playing {
            self.emit(PlaybackEvent::Ready);
            self.emit(PlaybackEvent::StartPlayback);
        } else {
            self.emit(PlaybackEvent::StopPlayback);
        }
    }

    fn play(self: &Arc<Self>, time: f64) {
        self.clone().spawn_poll(Command::Seek { time });

        // Preempt the round trip so controls react immediately
        self.emit(PlaybackEvent::StopPlayback);
        self.emit(PlaybackEvent::PlayingBegan);
        self.emit(PlaybackEvent::SeekTo(time));

        // Playback actually starts once every viewer is ready
        self.emit(PlaybackEvent::Busy);
    }

    fn pause(self: &Arc<Self>, time: f64) {
        self.clone().spawn_poll(Command::Pause { time });

        self.emit(PlaybackEvent::StopPlayback);
        self.emit(PlaybackEvent::PlayingEnded);
        self.emit(PlaybackEvent::SeekTo(time));
    }

    /// Dispatch a seek as play or pause depending on the last known
    /// authoritative play state
    async fn seek(self: &Arc<Self>, time: f64) {
        let playing = {
            let state = self.state.lock().await;
            state
                .last_document
                .as_ref()
                .is_some_and(|d| d.logically_playing())
        };
        if playing {
            self.play(time);
        } else {
            self.pause(time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Transport that hands out queued responses and records requests
    struct MockTransport {
        requests: std::sync::Mutex<Vec<PollRequest>>,
        responses: std::sync::Mutex<VecDeque<Result<SessionDocument, TransportError>>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                requests: std::sync::Mutex::new(Vec::new()),
                responses: std::sync::Mutex::new(VecDeque::new()),
            }
        }

        fn push(&self, response: Result<SessionDocument, TransportError>) {
            self.responses.lock().unwrap().push_back(response);
        }
    }

    #[async_trait]
    impl SyncTransport for Arc<MockTransport> {
        async fn poll(&self, request: &PollRequest) -> Result<SessionDocument, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Unreachable("no response queued".into())))
        }
    }

    fn test_client() -> (SyncClient, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = SyncClient::new(transport.clone());
        (client, transport)
    }

    fn document(time: f64) -> SessionDocument {
        let mut doc = SessionDocument::new(Some("http://example.com/v.mp4".into()));
        doc.time = time;
        doc
    }

    fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_first_response_reports_url_and_viewers() {
        let (client, _) = test_client();
        let mut rx = client.subscribe();

        let mut doc = document(10.0);
        doc.viewers.insert(
            "self".into(),
            watchsync_core::model::ViewerRecord {
                report: ViewerReport::default(),
                last_contact: 10.0,
            },
        );
        doc.video_time = 5.0;

        let target = client.inner.apply_response(doc, 0.1).await;

        // Not playing, so the catch-up target is the playhead as-is
        assert_eq!(target, Some(5.0));
        let events = drain(&mut rx);
        assert!(events.contains(&PlaybackEvent::ViewerCountChanged(0)));
        assert!(events.contains(&PlaybackEvent::VideoUrlChanged(Some(
            "http://example.com/v.mp4".into()
        ))));
    }

    #[tokio::test]
    async fn test_out_of_order_response_discarded_silently() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut rx = client.subscribe();
        // Equal and older times are both dropped with zero callbacks
        client.inner.apply_response(document(10.0), 0.0).await;
        client.inner.apply_response(document(9.0), 0.0).await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        let state = client.inner.state.lock().await;
        assert_eq!(state.last_document.as_ref().unwrap().time, 10.0);
    }

    #[tokio::test]
    async fn test_unchanged_document_is_idempotent() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut rx = client.subscribe();
        // Same content, newer stamp: accepted, but nothing to report
        client.inner.apply_response(document(11.0), 0.0).await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_round_trip_measurement_last_sample_wins() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.25).await;
        client.inner.apply_response(document(11.0), 0.03).await;

        let state = client.inner.state.lock().await;
        assert_eq!(state.report.round_trip_time, 0.03);
    }

    #[tokio::test]
    async fn test_barrier_flag_toggles_busy_and_ready() {
        let (client, _) = test_client();
        client.ready().await;
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut rx = client.subscribe();
        let mut doc = document(11.0);
        doc.video_play_on_all_ready = true;
        client.inner.apply_response(doc, 0.0).await;

        let events = drain(&mut rx);
        assert!(events.contains(&PlaybackEvent::Busy));
        // Armed barrier also flips the logical play state
        assert!(events.contains(&PlaybackEvent::PlayingBegan));

        // Flag clears without playback (a pause won the race): Ready fires
        // because this viewer is itself ready
        let mut doc = document(12.0);
        doc.video_play_on_all_ready = false;
        client.inner.apply_response(doc, 0.0).await;

        let events = drain(&mut rx);
        assert!(events.contains(&PlaybackEvent::Ready));
        assert!(events.contains(&PlaybackEvent::PlayingEnded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_transition_fires_after_delta() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut rx = client.subscribe();
        let mut doc = document(11.0);
        doc.video_playing = true;
        doc.video_time = 3.0;
        // Start scheduled 2s past the response stamp; rtt 0 -> delta = 2.0
        doc.state_change_time = 13.0;
        client.inner.apply_response(doc, 0.0).await;

        // Spinner and seek fire immediately, the start does not
        let events = drain(&mut rx);
        assert!(events.contains(&PlaybackEvent::Busy));
        assert!(events.contains(&PlaybackEvent::SeekTo(3.0)));
        assert!(!events.contains(&PlaybackEvent::StartPlayback));

        tokio::time::sleep(Duration::from_millis(2100)).await;
        settle().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![PlaybackEvent::Ready, PlaybackEvent::StartPlayback]
        );

        // And the observed change is echoed in the next report
        let state = client.inner.state.lock().await;
        assert_eq!(state.report.state_change_time, 13.0);
    }

    #[tokio::test]
    async fn test_past_transition_fires_immediately() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut rx = client.subscribe();
        let mut doc = document(11.0);
        doc.state_change_time = 10.5; // already in the past
        client.inner.apply_response(doc, 0.0).await;

        let events = drain(&mut rx);
        // Paused transition: engine stop, plus the immediate seek
        assert!(events.contains(&PlaybackEvent::StopPlayback));
        assert!(events.contains(&PlaybackEvent::SeekTo(0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_state_change_replaces_pending_transition() {
        let (client, _) = test_client();
        client.inner.apply_response(document(10.0), 0.0).await;

        let mut doc = document(11.0);
        doc.video_playing = true;
        doc.state_change_time = 16.0; // 5s out
        client.inner.apply_response(doc, 0.0).await;

        let mut rx = client.subscribe();
        // A pause lands before the start fires
        let mut doc = document(12.0);
        doc.video_playing = false;
        doc.state_change_time = 11.9;
        client.inner.apply_response(doc, 0.0).await;
        drain(&mut rx);

        // Long past the original start time: the aborted transition must
        // never fire
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert!(!drain(&mut rx).contains(&PlaybackEvent::StartPlayback));
    }

    #[tokio::test]
    async fn test_play_fires_optimistic_events_and_sends_seek() {
        let (client, transport) = test_client();
        let mut rx = client.subscribe();

        client.play(7.5).await;
        settle().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                PlaybackEvent::StopPlayback,
                PlaybackEvent::PlayingBegan,
                PlaybackEvent::SeekTo(7.5),
                PlaybackEvent::Busy,
            ]
        );

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, Command::Seek { time: 7.5 });
    }

    #[tokio::test]
    async fn test_pause_fires_optimistic_events_and_sends_pause() {
        let (client, transport) = test_client();
        let mut rx = client.subscribe();

        client.pause(3.0).await;
        settle().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                PlaybackEvent::StopPlayback,
                PlaybackEvent::PlayingEnded,
                PlaybackEvent::SeekTo(3.0),
            ]
        );

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].command, Command::Pause { time: 3.0 });
    }

    #[tokio::test]
    async fn test_seek_dispatches_on_last_known_play_state() {
        let (client, transport) = test_client();

        // No document yet: treated as paused
        client.seek(1.0).await;
        settle().await;
        assert_eq!(
            transport.requests.lock().unwrap()[0].command,
            Command::Pause { time: 1.0 }
        );

        let mut doc = document(10.0);
        doc.video_play_on_all_ready = true;
        client.inner.apply_response(doc, 0.0).await;

        client.seek(2.0).await;
        settle().await;
        assert_eq!(
            transport.requests.lock().unwrap()[1].command,
            Command::Seek { time: 2.0 }
        );
    }

    #[tokio::test]
    async fn test_busy_when_ready_reseeks_and_clears_readiness() {
        let (client, transport) = test_client();
        client.ready().await;

        client.busy(4.0).await;
        settle().await;

        let state = client.inner.state.lock().await;
        assert!(!state.report.ready);
        drop(state);

        // The re-seek pauses peers at our position until we recover
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, Command::Pause { time: 4.0 });
        // Readiness was already withdrawn when the report went out
        assert!(!requests[0].report.ready);
    }

    #[tokio::test]
    async fn test_busy_when_not_ready_sends_nothing() {
        let (client, transport) = test_client();
        client.busy(4.0).await;
        settle().await;
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_error_is_fatal_and_stops_reconciling() {
        let (client, transport) = test_client();
        let mut rx = client.subscribe();

        transport.push(Err(TransportError::Session("Session not found: x".into())));
        client.inner.poll_once(Command::None).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![PlaybackEvent::FatalError("Session not found: x".into())]
        );

        // Further polls are suppressed entirely
        transport.push(Ok(document(10.0)));
        client.inner.poll_once(Command::None).await;
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unreachable_error_is_transient() {
        let (client, transport) = test_client();
        let mut rx = client.subscribe();

        transport.push(Err(TransportError::Unreachable("refused".into())));
        client.inner.poll_once(Command::None).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Next poll proceeds normally
        transport.push(Ok(document(10.0)));
        client.inner.poll_once(Command::None).await;
        assert!(drain(&mut rx)
            .contains(&PlaybackEvent::VideoUrlChanged(Some("http://example.com/v.mp4".into()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_polls_on_interval() {
        let (client, transport) = test_client();
        client.start().await;

        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;
        client.stop().await;

        // Immediate first tick plus three 0.5s intervals
        let count = transport.requests.lock().unwrap().len();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_url_change_while_playing_compensates_elapsed_time() {
        let (client, _) = test_client();

        let mut doc = document(20.0);
        doc.video_playing = true;
        doc.video_time = 100.0;
        doc.state_change_time = 14.0; // started 6s ago
        let target = client.inner.apply_response(doc, 1.0).await;

        // 6s since the transition plus half the 1s round trip
        assert_eq!(target, Some(106.5));
    }
}
