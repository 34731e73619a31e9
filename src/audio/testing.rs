//! Scripted sink and drop-counting audio used by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

use crate::{
    audio::{
        sink::{AudioSink, FinishReason, FinishedSignal},
        track::{AudioSource, Track, TrackInfo},
    },
    error::{Result, SessionError},
};

/// Counts every handle opened and released.
#[derive(Debug, Default)]
pub struct Ledger {
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.opened() - self.released()
    }
}

#[derive(Debug)]
pub struct TestAudio {
    pub name: String,
    ledger: Arc<Ledger>,
    replayable: bool,
}

impl TestAudio {
    pub fn new(name: &str, ledger: &Arc<Ledger>) -> Self {
        ledger.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            name: name.to_string(),
            ledger: ledger.clone(),
            replayable: true,
        }
    }

    pub fn one_shot(name: &str, ledger: &Arc<Ledger>) -> Self {
        let mut audio = Self::new(name, ledger);
        audio.replayable = false;
        audio
    }
}

impl Drop for TestAudio {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioSource for TestAudio {
    fn reopen(&self) -> Option<Self> {
        self.replayable.then(|| TestAudio::new(&self.name, &self.ledger))
    }
}

pub fn track(name: &str, requester: u64, ledger: &Arc<Ledger>) -> Track<TestAudio> {
    Track::new(
        TrackInfo::new(name, UserId::new(requester)),
        TestAudio::new(name, ledger),
    )
}

#[derive(Debug, Default)]
struct Playing {
    current: Option<(TestAudio, FinishedSignal)>,
    paused: bool,
    volume: f32,
}

#[derive(Debug)]
struct Inner {
    playing: Mutex<Playing>,
    started_tx: mpsc::UnboundedSender<String>,
    started_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    fail_play: AtomicBool,
    volume_delay: Mutex<Option<Duration>>,
    disconnects: AtomicUsize,
}

/// In-memory sink driven by the test: tracks only finish when the test says
/// so (or when they are stopped).
#[derive(Debug, Clone)]
pub struct ScriptedSink {
    inner: Arc<Inner>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                playing: Mutex::new(Playing::default()),
                started_tx,
                started_rx: tokio::sync::Mutex::new(started_rx),
                fail_play: AtomicBool::new(false),
                volume_delay: Mutex::new(None),
                disconnects: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for the next track to start and returns its name.
    pub async fn started(&self) -> Option<String> {
        let mut rx = self.inner.started_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Asserts nothing starts within a short window.
    pub async fn nothing_started(&self) -> bool {
        let mut rx = self.inner.started_rx.lock().await;
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err()
    }

    /// Ends the current track as if it reached its natural end.
    pub fn finish_current(&self) -> bool {
        let taken = self.inner.playing.lock().current.take();
        match taken {
            Some((audio, signal)) => {
                drop(audio);
                signal.fire(FinishReason::Ended);
                true
            }
            None => false,
        }
    }

    pub fn current_name(&self) -> Option<String> {
        self.inner
            .playing
            .lock()
            .current
            .as_ref()
            .map(|(audio, _)| audio.name.clone())
    }

    pub fn volume(&self) -> f32 {
        self.inner.playing.lock().volume
    }

    pub fn fail_next_play(&self) {
        self.inner.fail_play.store(true, Ordering::SeqCst);
    }

    /// The next `set_volume` waits this long before applying.
    pub fn delay_next_volume(&self, delay: Duration) {
        *self.inner.volume_delay.lock() = Some(delay);
    }

    pub fn disconnects(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    fn end_current(&self) {
        let taken = self.inner.playing.lock().current.take();
        if let Some((audio, signal)) = taken {
            drop(audio);
            signal.fire(FinishReason::Ended);
        }
    }
}

#[async_trait]
impl AudioSink for ScriptedSink {
    type Source = TestAudio;

    async fn play(&self, source: TestAudio, volume: f32, on_finished: FinishedSignal) -> Result<()> {
        if self.inner.fail_play.swap(false, Ordering::SeqCst) {
            return Err(SessionError::Sink("fallo simulado".to_string()));
        }
        self.end_current();
        let name = source.name.clone();
        {
            let mut playing = self.inner.playing.lock();
            playing.current = Some((source, on_finished));
            playing.paused = false;
            playing.volume = volume;
        }
        let _ = self.inner.started_tx.send(name);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut playing = self.inner.playing.lock();
        if playing.current.is_some() {
            playing.paused = true;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.inner.playing.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.end_current();
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let delay = self.inner.volume_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.playing.lock().volume = volume;
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let playing = self.inner.playing.lock();
        playing.current.is_some() && !playing.paused
    }

    async fn is_paused(&self) -> bool {
        let playing = self.inner.playing.lock();
        playing.current.is_some() && playing.paused
    }

    async fn disconnect(&self) {
        self.end_current();
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
