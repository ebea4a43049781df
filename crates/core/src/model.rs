//! Session document and viewer state
//!
//! All timestamps are f64 seconds. Fields named `*_time` that are compared
//! against `SessionDocument::time` are on the server's clock (seconds since
//! the Unix epoch as observed by the server process); viewers never interpret
//! them against their own wall clock, only against `time` echoed in the same
//! response.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Viewers with no contact for this long are pruned on every reconciliation.
pub const MAX_POLL_INTERVAL: f64 = 5.0;

/// Slack added on top of the worst-case viewer latency before synchronized
/// playback starts.
pub const PLAY_START_SLACK: f64 = 1.0;

/// Default interval between client polls.
pub const DEFAULT_POLL_INTERVAL: f64 = 0.5;

/// `last_contact` is backdated by this much at merge time so the freshness
/// predicate holds for a viewer just heard from, even under clock-resolution
/// rounding.
pub const CONTACT_BACKDATE: f64 = 0.001;

/// Round-trip estimate reported before the first measurement arrives.
pub const INITIAL_ROUND_TRIP: f64 = 0.1;

/// Current server clock in seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Readiness and timing state a viewer sends on every poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerReport {
    /// Is the video buffered and ready to play?
    pub ready: bool,

    /// Most recently measured round-trip time to the server, in seconds.
    /// Last sample wins; no smoothing is applied.
    pub round_trip_time: f64,

    /// How frequently this viewer tries to poll the server, in seconds
    pub poll_interval: f64,

    /// The most recent `state_change_time` this viewer has observed. Echoed
    /// back so the server can tell whether the viewer has seen the latest
    /// authoritative transition.
    pub state_change_time: f64,
}

impl Default for ViewerReport {
    fn default() -> Self {
        Self {
            ready: false,
            round_trip_time: INITIAL_ROUND_TRIP,
            poll_interval: DEFAULT_POLL_INTERVAL,
            // Before the first response, no state change has been observed
            state_change_time: -1.0,
        }
    }
}

/// A viewer's report as merged into the session document by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerRecord {
    #[serde(flatten)]
    pub report: ViewerReport,

    /// Server timestamp of the last poll from this viewer, assigned at merge
    /// time (backdated by [`CONTACT_BACKDATE`])
    pub last_contact: f64,
}

/// The single authoritative, persisted record of shared playback state for
/// one viewing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    /// URL of the video being watched
    pub video_url: Option<String>,

    /// Should playback start once every registered viewer is ready?
    pub video_play_on_all_ready: bool,

    /// Should the video be playing right now?
    pub video_playing: bool,

    /// Playhead position to seek to at `state_change_time`, in seconds
    pub video_time: f64,

    /// Server timestamp of the most recent authoritative playback transition
    pub state_change_time: f64,

    /// Server timestamp stamped on every response
    pub time: f64,

    /// Viewer id to viewer record
    pub viewers: HashMap<String, ViewerRecord>,
}

impl SessionDocument {
    /// The zeroed default document written when a session is created
    pub fn new(video_url: Option<String>) -> Self {
        Self {
            video_url,
            video_play_on_all_ready: false,
            video_playing: false,
            video_time: 0.0,
            state_change_time: 0.0,
            time: 0.0,
            viewers: HashMap::new(),
        }
    }

    /// Pause playback and move the playhead. This is the single mutator that
    /// advances `state_change_time`; playback resumes (if requested) through
    /// the all-ready barrier, never directly.
    ///
    /// Expects `self.time` to already carry the current reconciliation
    /// timestamp.
    pub fn seek_to(&mut self, time: f64) {
        self.video_playing = false;
        self.video_time = time;
        self.state_change_time = self.time;
    }

    /// Is the session logically playing, i.e. either actually playing or
    /// pending the all-ready barrier? This is what decides whether a UI shows
    /// the pause button.
    pub fn logically_playing(&self) -> bool {
        self.video_playing || self.video_play_on_all_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_to_pauses_and_stamps() {
        let mut doc = SessionDocument::new(Some("http://example.com/a.mp4".into()));
        doc.video_playing = true;
        doc.time = 42.0;

        doc.seek_to(13.5);

        assert!(!doc.video_playing);
        assert_eq!(doc.video_time, 13.5);
        assert_eq!(doc.state_change_time, 42.0);
    }

    #[test]
    fn test_logically_playing() {
        let mut doc = SessionDocument::new(None);
        assert!(!doc.logically_playing());

        doc.video_play_on_all_ready = true;
        assert!(doc.logically_playing());

        doc.video_play_on_all_ready = false;
        doc.video_playing = true;
        assert!(doc.logically_playing());
    }

    #[test]
    fn test_viewer_record_json_is_flat() {
        let record = ViewerRecord {
            report: ViewerReport {
                ready: true,
                round_trip_time: 0.05,
                poll_interval: 0.5,
                state_change_time: 7.0,
            },
            last_contact: 100.0,
        };

        let value = serde_json::to_value(&record).unwrap();
        // The report fields sit beside last_contact, not nested under it
        assert_eq!(value["ready"], serde_json::json!(true));
        assert_eq!(value["last_contact"], serde_json::json!(100.0));
    }

    #[test]
    fn test_document_round_trips_through_json() {
        let mut doc = SessionDocument::new(Some("http://example.com/v.mp4".into()));
        doc.time = 1.25;
        doc.viewers.insert(
            "viewer-1".to_string(),
            ViewerRecord {
                report: ViewerReport::default(),
                last_contact: 1.249,
            },
        );

        let json = serde_json::to_string(&doc).unwrap();
        let back: SessionDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
