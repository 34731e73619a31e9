use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::sink::{AudioSink, FinishReason, FinishedSignal},
    error::{Result, SessionError},
    sources::ytdlp::YtDlpSource,
};

/// Audio sink backed by a Songbird voice call.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    /// Conecta al canal de voz
    pub async fn connect(manager: Arc<Songbird>, guild_id: GuildId, channel_id: ChannelId) -> Result<Self> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| SessionError::Sink(format!("no se pudo unir al canal: {e:?}")))?;

        Ok(Self {
            manager,
            guild_id,
            call,
            current: Mutex::new(None),
        })
    }

    /// Mueve la llamada a otro canal del mismo servidor
    pub async fn move_to(&self, channel_id: ChannelId) -> Result<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| SessionError::Sink(format!("no se pudo mover al canal: {e:?}")))?;
        Ok(())
    }

    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    type Source = YtDlpSource;

    async fn play(&self, source: YtDlpSource, volume: f32, on_finished: FinishedSignal) -> Result<()> {
        let input = source.into_input();
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        // End y Error comparten la señal: la primera que llegue la consume
        let signal = Arc::new(Mutex::new(Some(on_finished)));
        for (event, reason) in [
            (TrackEvent::End, FinishReason::Ended),
            (TrackEvent::Error, FinishReason::Errored("error de reproducción".to_string())),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishNotifier {
                        guild_id: self.guild_id,
                        signal: signal.clone(),
                        reason,
                    },
                )
                .map_err(|e| SessionError::Sink(format!("no se pudo registrar el evento: {e}")))?;
        }

        if let Err(e) = handle.set_volume(volume) {
            warn!("⚠️ No se pudo ajustar el volumen en guild {}: {}", self.guild_id, e);
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(handle) = self.handle() {
            handle.pause().map_err(|e| SessionError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(handle) = self.handle() {
            handle.play().map_err(|e| SessionError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            // Si el track ya terminó el handle no responde; no es un error
            if let Err(e) = handle.stop() {
                debug!("Track ya detenido en guild {}: {}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        if let Some(handle) = self.handle() {
            handle
                .set_volume(volume)
                .map_err(|e| SessionError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        match self.handle() {
            Some(handle) => matches!(handle.get_info().await, Ok(state) if matches!(state.playing, PlayMode::Play)),
            None => false,
        }
    }

    async fn is_paused(&self) -> bool {
        match self.handle() {
            Some(handle) => matches!(handle.get_info().await, Ok(state) if matches!(state.playing, PlayMode::Pause)),
            None => false,
        }
    }

    async fn disconnect(&self) {
        self.current.lock().take();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al salir del canal en guild {}: {:?}", self.guild_id, e);
        }
        info!("👋 Desconectado de voz en guild {}", self.guild_id);
    }
}

/// Dispara la señal de fin de la sesión cuando Songbird termina el track
struct TrackFinishNotifier {
    guild_id: GuildId,
    signal: Arc<Mutex<Option<FinishedSignal>>>,
    reason: FinishReason,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            debug!("🏁 Track terminado en guild {} ({:?})", self.guild_id, self.reason);
            signal.fire(self.reason.clone());
        }
        // Cancela el evento: no volverá a dispararse para este track
        Some(Event::Cancel)
    }
}
