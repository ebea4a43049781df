//! Playback instructions emitted by the controller
//!
//! Delivered on a broadcast channel; a playback engine subscribes and drives
//! the actual media element from them. Engine-level events (`StartPlayback`,
//! `StopPlayback`, `SeekTo`) move the decoder; logical events
//! (`PlayingBegan`/`PlayingEnded`) track what the controls should display,
//! which leads actual playback while the all-ready barrier is pending.

/// One playback instruction for the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Begin actual media playback
    StartPlayback,

    /// Stop actual media playback
    StopPlayback,

    /// The session logically started playing (show the pause button)
    PlayingBegan,

    /// The session logically stopped playing (show the play button)
    PlayingEnded,

    /// Move the playhead to this position in seconds
    SeekTo(f64),

    /// Playback is blocked waiting for something (show a spinner)
    Busy,

    /// Playback may proceed normally
    Ready,

    /// The number of other viewers changed (excludes this viewer)
    ViewerCountChanged(usize),

    /// The video being watched changed
    VideoUrlChanged(Option<String>),

    /// Unrecoverable session error; the controller has stopped reconciling
    FatalError(String),
}
