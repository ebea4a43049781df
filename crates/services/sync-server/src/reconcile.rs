//! Per-poll reconciliation
//!
//! One call to [`reconcile`] is one poll: merge the reporting viewer, age out
//! unreachable viewers, apply any playback command, and decide whether
//! synchronized playback may begin. The function is pure over the document
//! (the caller supplies `now`), so every property of the protocol can be
//! tested without a clock or a store.
//!
//! Callers must hold the session's exclusive update scope across the whole
//! load→reconcile→save sequence; no two reconciliations for the same session
//! may ever run concurrently.

use watchsync_core::model::{
    SessionDocument, ViewerRecord, ViewerReport, CONTACT_BACKDATE, MAX_POLL_INTERVAL,
    PLAY_START_SLACK,
};
use watchsync_core::protocol::Command;

/// Tunables for reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Viewers silent for this long are pruned
    pub max_poll_interval: f64,

    /// Slack added on top of the worst-case viewer latency when scheduling
    /// the synchronized playback start
    pub play_start_slack: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_poll_interval: MAX_POLL_INTERVAL,
            play_start_slack: PLAY_START_SLACK,
        }
    }
}

/// Merge one viewer's report into the session document and evaluate the
/// start-together barrier.
///
/// `now` is the server clock in seconds since the Unix epoch. It is stamped
/// into `document.time` and is the timestamp all `state_change_time` values
/// are derived from.
pub fn reconcile(
    document: &mut SessionDocument,
    viewer_id: &str,
    report: ViewerReport,
    command: Command,
    now: f64,
    config: &ReconcileConfig,
) {
    // Merge the report. last_contact is backdated slightly so the freshness
    // predicate below holds for the viewer we just heard from, even under
    // clock-resolution rounding.
    document.viewers.insert(
        viewer_id.to_string(),
        ViewerRecord {
            report,
            last_contact: now - CONTACT_BACKDATE,
        },
    );

    // Prune viewers who haven't been in contact in a while
    let before = document.viewers.len();
    document
        .viewers
        .retain(|_, record| now - record.last_contact < config.max_poll_interval);
    if document.viewers.len() != before {
        tracing::info!(
            pruned = before - document.viewers.len(),
            remaining = document.viewers.len(),
            "Pruned unreachable viewers"
        );
    }

    document.time = now;

    // Execute the arriving command. Both variants route through seek_to, the
    // single mutator that advances state_change_time; Seek additionally arms
    // the barrier so playback resumes once everyone has caught up.
    match command {
        Command::Pause { time } => {
            document.video_play_on_all_ready = false;
            document.seek_to(time);
        }
        Command::Seek { time } => {
            document.video_play_on_all_ready = true;
            document.seek_to(time);
        }
        Command::None => {}
    }

    // Barrier: every registered viewer must have echoed the current
    // state_change_time and be ready. The reporting viewer was merged above,
    // so the map is never empty here.
    let all_ready = document.viewers.values().all(|record| {
        record.report.state_change_time == document.state_change_time && record.report.ready
    });

    if all_ready && document.video_play_on_all_ready {
        // Work out how far in the future the start must be scheduled for the
        // slowest viewer to hear about it in time.
        let max_latency = document
            .viewers
            .values()
            .map(|record| record.report.poll_interval + record.report.round_trip_time)
            .fold(0.0, f64::max);

        document.video_playing = true;
        document.state_change_time = now + max_latency + config.play_start_slack;
        document.video_play_on_all_ready = false;

        tracing::info!(
            start_at = document.state_change_time,
            max_latency,
            viewers = document.viewers.len(),
            "All viewers ready, scheduling synchronized playback start"
        );
    }
}
