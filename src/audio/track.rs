use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// Audio resource that can be handed to a sink.
///
/// The value itself is the resource: dropping it releases whatever it holds
/// (a process, a connection, a buffer). A track owns exactly one of these
/// until it is either played (ownership moves into the sink) or discarded.
pub trait AudioSource: Send + 'static {
    /// Opens an independent handle to the same audio, used when loop mode
    /// puts a finished track back at the head of the queue.
    ///
    /// Returns `None` for sources that cannot be played twice.
    fn reopen(&self) -> Option<Self>
    where
        Self: Sized;
}

/// Presentation metadata of a track. Cheap to clone, never owns audio.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub url: Option<String>,
    pub duration: Option<Duration>,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            url: None,
            duration: None,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A resolved, playable source plus who asked for it.
#[derive(Debug)]
pub struct Track<A> {
    info: TrackInfo,
    audio: A,
}

impl<A: AudioSource> Track<A> {
    pub fn new(info: TrackInfo, audio: A) -> Self {
        Self { info, audio }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    /// Splits the track so the audio can move into a sink while the
    /// metadata stays with the session.
    pub fn into_parts(self) -> (TrackInfo, A) {
        (self.info, self.audio)
    }
}
