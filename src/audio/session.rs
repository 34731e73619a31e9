//! Per-session playback controller.
//!
//! One [`SessionController`] owns the queue, the skip votes and the playback
//! flags of a single voice session, and runs a background task (the playback
//! loop) that drains the queue into the audio sink one track at a time.
//!
//! Command handlers call the controller's methods concurrently with the
//! loop. All state sits behind one `parking_lot::Mutex`, never held across an
//! `.await`, so commands on one session are linearized while different
//! sessions never contend.
//!
//! ## Loop
//!
//! ```text
//! Idle ──queue non-empty──▶ Playing ──finished──▶ Idle (loop mode may requeue)
//!   ▲   ◀──────enqueue──────   │  ▲
//!   │                        pause resume
//!   │                          ▼  │
//!   └───────skip / votes──── Paused
//!
//! any ──stop──▶ Stopping ──▶ Terminated
//! ```
//!
//! The loop only suspends in two places: waiting for the queue to fill and
//! waiting for the sink's finished signal. A stop interrupts both.

use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{QueuePage, TrackQueue},
        sink::{AudioSink, FinishReason, Finished, FinishedSignal},
        skip_votes::{SkipVotes, VoteOutcome, DEFAULT_SKIP_THRESHOLD},
        track::{AudioSource, Track, TrackInfo},
    },
    error::{Result, SessionError},
};

/// Whether a finished track goes back to the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
}

impl LoopMode {
    pub fn toggled(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Off,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == LoopMode::Track
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_volume: f32,
    pub skip_threshold: usize,
    pub page_size: usize,
    /// How long a stop waits for the sink to confirm the current track ended
    pub stop_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            skip_threshold: DEFAULT_SKIP_THRESHOLD,
            page_size: 10,
            stop_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone)]
struct NowPlaying {
    play_id: u64,
    info: TrackInfo,
}

struct SessionState<A> {
    queue: TrackQueue<A>,
    votes: SkipVotes,
    current: Option<NowPlaying>,
    loop_mode: LoopMode,
    volume: f32,
    /// Play id the pending skip applies to
    pending_skip: Option<u64>,
    next_play_id: u64,
    phase: Phase,
}

impl<A: AudioSource> SessionState<A> {
    fn ensure_open(&self) -> Result<()> {
        match self.phase {
            Phase::Running => Ok(()),
            _ => Err(SessionError::SessionClosed),
        }
    }

    fn current(&self) -> Result<&NowPlaying> {
        self.current.as_ref().ok_or(SessionError::NoActiveSession)
    }
}

struct Shared<S: AudioSink> {
    label: String,
    state: Mutex<SessionState<S::Source>>,
    sink: S,
    /// Wakes the loop while it waits on an empty queue
    wake: Notify,
    /// Wakes the loop while it waits on a track, to apply `pending_skip`
    skip: Notify,
    /// Serializes volume changes with the sink calls that apply them
    volume_gate: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    settings: SessionSettings,
}

impl<S: AudioSink> Shared<S> {
    /// Marks the session as stopping and interrupts the loop.
    fn begin_shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Running {
                state.phase = Phase::Stopping;
                state.queue.clear();
            }
        }
        self.shutdown.cancel();
    }
}

pub struct SessionController<S: AudioSink> {
    shared: Arc<Shared<S>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S: AudioSink> SessionController<S> {
    /// Creates the session and starts its playback loop on the current
    /// tokio runtime.
    pub fn spawn(label: impl Into<String>, sink: S, settings: SessionSettings) -> Self {
        let label = label.into();
        let state = SessionState {
            queue: TrackQueue::new(),
            votes: SkipVotes::new(settings.skip_threshold),
            current: None,
            loop_mode: LoopMode::Off,
            volume: settings.default_volume.clamp(0.0, 1.0),
            pending_skip: None,
            next_play_id: 0,
            phase: Phase::Running,
        };

        let shared = Arc::new(Shared {
            label,
            state: Mutex::new(state),
            sink,
            wake: Notify::new(),
            skip: Notify::new(),
            volume_gate: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            settings,
        });

        let task = tokio::spawn(playback_loop(shared.clone()));

        Self {
            shared,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Agrega un track al final de la cola. Devuelve su posición (1-based).
    pub fn enqueue(&self, track: Track<S::Source>) -> Result<usize> {
        let position = {
            let mut state = self.shared.state.lock();
            state.ensure_open()?;
            state.queue.enqueue(track)
        };
        self.shared.wake.notify_one();
        Ok(position)
    }

    /// Registra un voto para saltar la canción actual
    pub fn skip_vote(&self, voter: UserId) -> Result<VoteOutcome> {
        let outcome = {
            let mut state = self.shared.state.lock();
            state.ensure_open()?;
            let (play_id, requester) = {
                let current = state.current()?;
                (current.play_id, current.info.requested_by)
            };
            let outcome = state.votes.cast(voter, requester);
            if outcome.skips() {
                state.pending_skip = Some(play_id);
            }
            outcome
        };

        match outcome {
            VoteOutcome::Recorded(count) => {
                debug!("🗳️ Voto de {} en {}: {}/{}", voter, self.shared.label, count, self.skip_threshold());
            }
            VoteOutcome::ImmediateSkip | VoteOutcome::ThresholdReached => {
                info!("⏭️ Salto aprobado en {} ({:?})", self.shared.label, outcome);
                self.shared.skip.notify_one();
            }
            VoteOutcome::AlreadyVoted => {}
        }

        Ok(outcome)
    }

    /// Salta la canción actual sin votación
    pub fn skip(&self) -> Result<TrackInfo> {
        let info = {
            let mut state = self.shared.state.lock();
            state.ensure_open()?;
            let (play_id, info) = {
                let current = state.current()?;
                (current.play_id, current.info.clone())
            };
            state.pending_skip = Some(play_id);
            info
        };
        self.shared.skip.notify_one();
        info!("⏭️ Saltando en {}: {}", self.shared.label, info.title);
        Ok(info)
    }

    pub async fn pause(&self) -> Result<()> {
        self.require_playing()?;
        self.shared.sink.pause().await?;
        info!("⏸️ Reproducción pausada en {}", self.shared.label);
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.require_playing()?;
        self.shared.sink.resume().await?;
        info!("▶️ Reproducción reanudada en {}", self.shared.label);
        Ok(())
    }

    /// Ajusta el volumen (0.0 - 1.0)
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SessionError::InvalidVolume(volume));
        }

        // El estado y el sink cambian juntos: nadie más toca el volumen hasta terminar
        let _gate = self.shared.volume_gate.lock().await;
        let playing = {
            let mut state = self.shared.state.lock();
            state.ensure_open()?;
            state.volume = volume;
            state.current.is_some()
        };

        if playing {
            self.shared.sink.set_volume(volume).await?;
        }
        info!("🔊 Volumen de {} ajustado a {}%", self.shared.label, (volume * 100.0).round() as u32);
        Ok(())
    }

    /// Ajusta el volumen a partir de un porcentaje 0-100
    pub async fn set_volume_percent(&self, percent: i64) -> Result<f32> {
        if !(0..=100).contains(&percent) {
            return Err(SessionError::InvalidVolume(percent as f32 / 100.0));
        }
        let volume = percent as f32 / 100.0;
        self.set_volume(volume).await?;
        Ok(volume)
    }

    pub fn volume(&self) -> f32 {
        self.shared.state.lock().volume
    }

    pub fn set_loop_mode(&self, mode: LoopMode) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        state.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada en {}", self.shared.label),
            LoopMode::Track => info!("🔂 Repetir canción activado en {}", self.shared.label),
        }
        Ok(())
    }

    /// Alterna el modo loop; devuelve el modo resultante
    pub fn toggle_loop(&self) -> Result<LoopMode> {
        let mode = {
            let mut state = self.shared.state.lock();
            state.ensure_open()?;
            state.loop_mode = state.loop_mode.toggled();
            state.loop_mode
        };
        debug!("🔁 Modo loop de {}: {:?}", self.shared.label, mode);
        Ok(mode)
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.shared.state.lock().loop_mode
    }

    /// Elimina el track en `index` (0-based) de la cola
    pub fn remove(&self, index: usize) -> Result<TrackInfo> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        state.queue.remove_at(index)
    }

    pub fn shuffle(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        state.queue.shuffle();
        Ok(())
    }

    /// Vacía la cola sin tocar la canción actual
    pub fn clear(&self) -> Result<usize> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        Ok(state.queue.clear())
    }

    pub fn now_playing(&self) -> Option<TrackInfo> {
        self.shared
            .state
            .lock()
            .current
            .as_ref()
            .map(|current| current.info.clone())
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Página `page` (1-based) de la cola, con el tamaño configurado
    pub fn queue_page(&self, page: usize) -> QueuePage {
        self.shared
            .state
            .lock()
            .queue
            .page(page, self.shared.settings.page_size)
    }

    pub fn snapshot(&self, start: usize, end: usize) -> Vec<TrackInfo> {
        self.shared.state.lock().queue.snapshot_range(start, end)
    }

    pub fn skip_threshold(&self) -> usize {
        self.shared.settings.skip_threshold.max(1)
    }

    /// El transporte de audio de esta sesión
    pub fn sink(&self) -> &S {
        &self.shared.sink
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().phase != Phase::Running
    }

    /// Current state; Playing/Paused come from what the sink reports.
    pub async fn state(&self) -> PlaybackState {
        let (phase, has_current) = {
            let state = self.shared.state.lock();
            (state.phase, state.current.is_some())
        };

        match phase {
            Phase::Terminated => PlaybackState::Terminated,
            Phase::Stopping => PlaybackState::Stopping,
            Phase::Running if !has_current => PlaybackState::Idle,
            Phase::Running if self.shared.sink.is_paused().await => PlaybackState::Paused,
            Phase::Running => PlaybackState::Playing,
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.now_playing().is_some() && self.shared.sink.is_playing().await
    }

    /// Detiene la sesión: vacía la cola, corta la canción actual, libera la
    /// conexión y espera a que el bucle termine. Llamarlo dos veces no hace
    /// nada la segunda vez.
    pub async fn stop(&self) {
        self.shared.begin_shutdown();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("❌ El bucle de reproducción de {} terminó con error: {:?}", self.shared.label, e);
            }
        }
    }

    fn require_playing(&self) -> Result<()> {
        let state = self.shared.state.lock();
        state.ensure_open()?;
        state.current().map(|_| ())
    }
}

impl<S: AudioSink> Drop for SessionController<S> {
    fn drop(&mut self) {
        // Sin controlador nadie puede detener el bucle; se cierra solo
        self.shared.begin_shutdown();
    }
}

async fn playback_loop<S: AudioSink>(shared: Arc<Shared<S>>) {
    info!("▶️ Bucle de reproducción iniciado para {}", shared.label);

    loop {
        let next = {
            let mut state = shared.state.lock();
            if state.phase != Phase::Running || shared.shutdown.is_cancelled() {
                break;
            }
            state.queue.dequeue_front()
        };

        let Some(track) = next else {
            debug!("📭 Cola vacía en {}, esperando", shared.label);
            tokio::select! {
                _ = shared.wake.notified() => {}
                _ = shared.shutdown.cancelled() => {}
            }
            continue;
        };

        if let Err(e) = play_track(&shared, track).await {
            error!("❌ Fallo en la conexión de audio de {}: {}", shared.label, e);
            shared.begin_shutdown();
            break;
        }
    }

    teardown(&shared).await;
}

async fn play_track<S: AudioSink>(shared: &Shared<S>, track: Track<S::Source>) -> Result<()> {
    let (info, audio) = track.into_parts();
    // `play` se queda con el audio, así que la copia para repetir se abre antes;
    // si al final no se repite, se libera al salir de esta función
    let replay = audio.reopen();
    let (signal, finished) = FinishedSignal::channel();

    // Un cambio de volumen en curso termina antes de que el sink arranque
    let volume_gate = shared.volume_gate.lock().await;
    let (play_id, volume) = {
        let mut state = shared.state.lock();
        state.next_play_id += 1;
        let play_id = state.next_play_id;
        state.votes.reset();
        state.pending_skip = None;
        state.current = Some(NowPlaying {
            play_id,
            info: info.clone(),
        });
        (play_id, state.volume)
    };

    info!("🎵 Reproduciendo en {}: {}", shared.label, info.title);
    let started = shared.sink.play(audio, volume, signal).await;
    drop(volume_gate);
    if let Err(e) = started {
        shared.state.lock().current = None;
        return Err(e);
    }

    let reason = wait_for_finish(shared, play_id, finished).await;

    let mut state = shared.state.lock();
    state.current = None;
    state.votes.reset();
    let skipped = state.pending_skip.take() == Some(play_id);

    match reason {
        FinishReason::Ended => debug!("🏁 Terminó en {}: {}", shared.label, info.title),
        FinishReason::Errored(e) => warn!("⚠️ La canción {} falló en {}: {}", info.title, shared.label, e),
    }

    // Un salto explícito nunca se repite, aunque el loop esté activo
    if skipped || state.phase != Phase::Running || !state.loop_mode.is_enabled() {
        return Ok(());
    }

    match replay {
        Some(audio) => state.queue.push_front(Track::new(info, audio)),
        None => warn!("🔂 No se puede repetir {}, se descarta", info.title),
    }
    Ok(())
}

async fn wait_for_finish<S: AudioSink>(
    shared: &Shared<S>,
    play_id: u64,
    mut finished: Finished,
) -> FinishReason {
    loop {
        tokio::select! {
            reason = &mut finished => return reason,
            _ = shared.skip.notified() => {
                // El aviso puede ser de una canción anterior
                let requested = shared.state.lock().pending_skip == Some(play_id);
                if requested {
                    if let Err(e) = shared.sink.stop().await {
                        error!("❌ No se pudo saltar en {}: {}", shared.label, e);
                        shared.begin_shutdown();
                    }
                }
            }
            _ = shared.shutdown.cancelled() => {
                if let Err(e) = shared.sink.stop().await {
                    warn!("⚠️ Error al detener el audio de {}: {}", shared.label, e);
                }
                return match tokio::time::timeout(shared.settings.stop_grace, finished).await {
                    Ok(reason) => reason,
                    Err(_) => {
                        warn!("⏰ {} no confirmó el fin de la canción a tiempo", shared.label);
                        FinishReason::Errored("sin confirmación al detener".to_string())
                    }
                };
            }
        }
    }
}

async fn teardown<S: AudioSink>(shared: &Shared<S>) {
    let discarded = {
        let mut state = shared.state.lock();
        state.phase = Phase::Stopping;
        state.current = None;
        state.pending_skip = None;
        state.votes.reset();
        state.queue.clear()
    };

    shared.sink.disconnect().await;
    shared.state.lock().phase = Phase::Terminated;
    shared.shutdown.cancel();

    info!("⏹️ Sesión {} terminada ({} canciones descartadas)", shared.label, discarded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{track, Ledger, ScriptedSink, TestAudio};
    use pretty_assertions::assert_eq;

    const REQUESTER: u64 = 10;

    fn session() -> (SessionController<ScriptedSink>, ScriptedSink, Arc<Ledger>) {
        let sink = ScriptedSink::new();
        let controller = SessionController::spawn("guild-test", sink.clone(), SessionSettings::default());
        (controller, sink, Ledger::new())
    }

    async fn wait_until_closed(session: &SessionController<ScriptedSink>) {
        for _ in 0..200 {
            if session.state().await == PlaybackState::Terminated {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("la sesión no terminó");
    }

    #[tokio::test]
    async fn plays_queue_in_order_and_stops_cleanly() {
        let (session, sink, ledger) = session();
        for name in ["t1", "t2", "t3"] {
            session.enqueue(track(name, REQUESTER, &ledger)).unwrap();
        }

        assert_eq!(sink.started().await.as_deref(), Some("t1"));
        assert_eq!(session.state().await, PlaybackState::Playing);
        assert_eq!(session.now_playing().map(|t| t.title), Some("t1".to_string()));

        assert!(sink.finish_current());
        assert_eq!(sink.started().await.as_deref(), Some("t2"));
        assert_eq!(session.queue_len(), 1);

        session.stop().await;
        assert_eq!(session.state().await, PlaybackState::Terminated);
        assert_eq!(session.queue_len(), 0);
        assert_eq!(sink.disconnects(), 1);
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn idle_loop_wakes_on_enqueue() {
        let (session, sink, ledger) = session();
        assert!(sink.nothing_started().await);
        assert_eq!(session.state().await, PlaybackState::Idle);

        session.enqueue(track("late", REQUESTER, &ledger)).unwrap();
        assert_eq!(sink.started().await.as_deref(), Some("late"));

        sink.finish_current();
        assert!(sink.nothing_started().await);
        assert_eq!(session.state().await, PlaybackState::Idle);
        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn loop_mode_requeues_finished_track() {
        let (session, sink, ledger) = session();
        assert_eq!(session.toggle_loop().unwrap(), LoopMode::Track);
        session.enqueue(track("x", REQUESTER, &ledger)).unwrap();

        assert_eq!(sink.started().await.as_deref(), Some("x"));
        assert_eq!(session.skip_vote(UserId::new(1)).unwrap(), VoteOutcome::Recorded(1));
        sink.finish_current();
        assert_eq!(sink.started().await.as_deref(), Some("x"));
        // La repetición es una reproducción nueva: los votos empiezan de cero
        assert_eq!(session.skip_vote(UserId::new(1)).unwrap(), VoteOutcome::Recorded(1));

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn loop_mode_does_not_requeue_skipped_track() {
        let (session, sink, ledger) = session();
        session.set_loop_mode(LoopMode::Track).unwrap();
        session.enqueue(track("x", REQUESTER, &ledger)).unwrap();
        assert_eq!(sink.started().await.as_deref(), Some("x"));

        session.skip().unwrap();
        assert!(sink.nothing_started().await);
        assert_eq!(session.queue_len(), 0);
        assert_eq!(session.now_playing(), None);

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn loop_mode_drops_sources_that_cannot_replay() {
        let (session, sink, ledger) = session();
        session.set_loop_mode(LoopMode::Track).unwrap();
        let once = Track::new(
            TrackInfo::new("once", UserId::new(REQUESTER)),
            TestAudio::one_shot("once", &ledger),
        );
        session.enqueue(once).unwrap();
        assert_eq!(sink.started().await.as_deref(), Some("once"));

        sink.finish_current();
        assert!(sink.nothing_started().await);
        assert_eq!(ledger.live(), 0);
        session.stop().await;
    }

    #[tokio::test]
    async fn votes_skip_after_threshold_and_reset_on_advance() {
        let (session, sink, ledger) = session();
        session.enqueue(track("a", REQUESTER, &ledger)).unwrap();
        session.enqueue(track("b", REQUESTER, &ledger)).unwrap();
        assert_eq!(sink.started().await.as_deref(), Some("a"));

        assert_eq!(session.skip_vote(UserId::new(1)).unwrap(), VoteOutcome::Recorded(1));
        assert_eq!(session.skip_vote(UserId::new(1)).unwrap(), VoteOutcome::AlreadyVoted);
        assert_eq!(session.skip_vote(UserId::new(2)).unwrap(), VoteOutcome::Recorded(2));
        assert_eq!(session.skip_vote(UserId::new(3)).unwrap(), VoteOutcome::ThresholdReached);

        assert_eq!(sink.started().await.as_deref(), Some("b"));
        assert_eq!(session.skip_vote(UserId::new(1)).unwrap(), VoteOutcome::Recorded(1));

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn requester_vote_skips_immediately() {
        let (session, sink, ledger) = session();
        session.enqueue(track("mine", REQUESTER, &ledger)).unwrap();
        session.enqueue(track("next", REQUESTER, &ledger)).unwrap();
        assert_eq!(sink.started().await.as_deref(), Some("mine"));

        assert_eq!(
            session.skip_vote(UserId::new(REQUESTER)).unwrap(),
            VoteOutcome::ImmediateSkip
        );
        assert_eq!(sink.started().await.as_deref(), Some("next"));
        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn control_without_current_track_is_rejected() {
        let (session, _sink, _ledger) = session();
        assert_eq!(session.skip_vote(UserId::new(1)), Err(SessionError::NoActiveSession));
        assert_eq!(session.skip().map(|t| t.title), Err(SessionError::NoActiveSession));
        assert_eq!(session.pause().await, Err(SessionError::NoActiveSession));
        session.stop().await;
    }

    #[tokio::test]
    async fn volume_is_validated_and_applied() {
        let (session, sink, ledger) = session();
        assert_eq!(
            session.set_volume_percent(150).await,
            Err(SessionError::InvalidVolume(1.5))
        );
        assert_eq!(session.set_volume(-0.1).await, Err(SessionError::InvalidVolume(-0.1)));

        assert_eq!(session.set_volume_percent(50).await, Ok(0.5));
        assert_eq!(session.volume(), 0.5);

        session.enqueue(track("loud", REQUESTER, &ledger)).unwrap();
        sink.started().await;
        assert_eq!(sink.volume(), 0.5);
        session.set_volume_percent(20).await.unwrap();
        assert_eq!(sink.volume(), 0.2);
        session.stop().await;
    }

    #[tokio::test]
    async fn overlapping_volume_changes_leave_sink_and_state_agreeing() {
        let (session, sink, ledger) = session();
        let session = Arc::new(session);
        session.enqueue(track("v", REQUESTER, &ledger)).unwrap();
        sink.started().await;

        sink.delay_next_volume(Duration::from_millis(100));
        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.set_volume(0.2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.set_volume(0.8).await.unwrap();
        slow.await.unwrap().unwrap();

        assert_eq!(session.volume(), 0.8);
        assert_eq!(sink.volume(), 0.8);
        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loop_toggles_never_lose_a_flip() {
        let (session, _sink, _ledger) = session();
        let session = Arc::new(session);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..250 {
                    session.toggle_loop().unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // 2000 cambios: vuelve al punto de partida
        assert_eq!(session.loop_mode(), LoopMode::Off);
        session.stop().await;
    }

    #[tokio::test]
    async fn pause_and_resume_follow_the_sink() {
        let (session, sink, ledger) = session();
        session.enqueue(track("p", REQUESTER, &ledger)).unwrap();
        sink.started().await;

        session.pause().await.unwrap();
        assert_eq!(session.state().await, PlaybackState::Paused);
        assert!(!session.is_playing().await);

        session.resume().await.unwrap();
        assert_eq!(session.state().await, PlaybackState::Playing);
        session.stop().await;
    }

    #[tokio::test]
    async fn closed_session_rejects_commands_and_stop_is_idempotent() {
        let (session, sink, ledger) = session();
        session.stop().await;
        session.stop().await;
        assert_eq!(sink.disconnects(), 1);

        assert_eq!(
            session.enqueue(track("late", REQUESTER, &ledger)),
            Err(SessionError::SessionClosed)
        );
        assert_eq!(session.shuffle(), Err(SessionError::SessionClosed));
        assert_eq!(session.toggle_loop(), Err(SessionError::SessionClosed));
        assert_eq!(session.set_volume(0.3).await, Err(SessionError::SessionClosed));
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn stop_mid_playback_releases_everything() {
        let (session, sink, ledger) = session();
        for name in ["a", "b", "c", "d"] {
            session.enqueue(track(name, REQUESTER, &ledger)).unwrap();
        }
        sink.started().await;
        session.pause().await.unwrap();

        session.stop().await;
        assert_eq!(sink.current_name(), None);
        assert_eq!(ledger.opened(), ledger.released());
    }

    #[tokio::test]
    async fn failing_sink_tears_down_only_its_session() {
        let (session, sink, ledger) = session();
        let (other, other_sink, _) = self::session();

        sink.fail_next_play();
        session.enqueue(track("bad", REQUESTER, &ledger)).unwrap();
        session.enqueue(track("never", REQUESTER, &ledger)).unwrap();
        wait_until_closed(&session).await;

        assert_eq!(sink.disconnects(), 1);
        assert_eq!(ledger.live(), 0);

        other.enqueue(track("fine", REQUESTER, &ledger)).unwrap();
        assert_eq!(other_sink.started().await.as_deref(), Some("fine"));
        other.stop().await;
    }

    #[tokio::test]
    async fn racing_skip_and_finish_advance_exactly_once() {
        let (session, sink, ledger) = session();
        for name in ["a", "b", "c"] {
            session.enqueue(track(name, REQUESTER, &ledger)).unwrap();
        }
        assert_eq!(sink.started().await.as_deref(), Some("a"));

        session.skip().unwrap();
        sink.finish_current();

        assert_eq!(sink.started().await.as_deref(), Some("b"));
        assert!(sink.nothing_started().await);
        assert_eq!(session.queue_len(), 1);

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }

    #[tokio::test]
    async fn concurrent_commands_keep_queue_consistent() {
        let (session, sink, ledger) = session();
        let session = Arc::new(session);
        session.enqueue(track("head", REQUESTER, &ledger)).unwrap();
        sink.started().await;

        let mut tasks = Vec::new();
        for i in 0..40 {
            let session = session.clone();
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                session.enqueue(track(&format!("t{i}"), REQUESTER, &ledger)).unwrap();
                if i % 4 == 0 {
                    session.shuffle().unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(session.queue_len(), 40);

        let mut removers = Vec::new();
        for _ in 0..10 {
            let session = session.clone();
            removers.push(tokio::spawn(async move { session.remove(0).map(|_| ()) }));
        }
        for remover in removers {
            assert_eq!(remover.await.unwrap(), Ok(()));
        }
        assert_eq!(session.queue_len(), 30);
        // 30 en cola + la que suena + su copia para repetir
        assert_eq!(ledger.live(), 32);

        session.stop().await;
        assert_eq!(ledger.live(), 0);
    }
}
