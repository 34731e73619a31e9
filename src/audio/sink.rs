//! Contract between the playback loop and the audio transport.
//!
//! The transport reports the end of a track through a [`FinishedSignal`]
//! handed over with each `play` call. The loop awaits the matching
//! [`Finished`] future instead of running code inside the transport's
//! callback context.

use async_trait::async_trait;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

use crate::{audio::track::AudioSource, error::Result};

/// Why a track stopped producing audio.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    /// Ran to completion or was stopped
    Ended,
    /// The transport gave up on the track
    Errored(String),
}

/// Sending half of the finished notification. Consumed on use, so a sink
/// cannot report the same play twice.
#[derive(Debug)]
pub struct FinishedSignal {
    tx: oneshot::Sender<FinishReason>,
}

impl FinishedSignal {
    pub fn channel() -> (FinishedSignal, Finished) {
        let (tx, rx) = oneshot::channel();
        (FinishedSignal { tx }, Finished { rx })
    }

    pub fn fire(self, reason: FinishReason) {
        // El receptor ya no existe si la sesión terminó; no hay nada que avisar
        let _ = self.tx.send(reason);
    }
}

/// Resolves once the sink reports the end of the track.
///
/// A signal dropped without firing (the sink lost the track) resolves as
/// [`FinishReason::Errored`], so the loop never waits forever.
#[derive(Debug)]
pub struct Finished {
    rx: oneshot::Receiver<FinishReason>,
}

impl Future for Finished {
    type Output = FinishReason;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(reason)) => Poll::Ready(reason),
            Poll::Ready(Err(_)) => Poll::Ready(FinishReason::Errored(
                "la señal de fin se perdió sin dispararse".to_string(),
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Opaque handle to a connected voice transport.
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    type Source: AudioSource;

    /// Starts streaming `source`. `on_finished` must fire exactly once for
    /// this call, including when playback is cut short by [`stop`].
    ///
    /// [`stop`]: AudioSink::stop
    async fn play(&self, source: Self::Source, volume: f32, on_finished: FinishedSignal) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Ends the current track early.
    async fn stop(&self) -> Result<()>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// Releases the connection. Called once, when the session terminates.
    async fn disconnect(&self);
}
