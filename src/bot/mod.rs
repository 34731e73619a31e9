//! # Bot Module
//!
//! Discord surface of the player: a serenity [`EventHandler`] that turns
//! prefixed chat messages into calls on the per-guild
//! [`SessionController`](crate::audio::session::SessionController).
//!
//! ## Architecture
//!
//! [`MusicBot`] owns:
//!
//! - the [`SessionRegistry`] with one session per guild
//! - the yt-dlp resolver used by `play`
//! - the optional Spotify catalog used for playlist imports
//!
//! Command parsing and dispatch live in [`handlers`].

use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod handlers;

use crate::{
    audio::{registry::SessionRegistry, songbird_sink::SongbirdSink},
    config::Config,
    sources::{SpotifyCatalog, YtDlpResolver},
};

/// Main Discord event handler of the player.
pub struct MusicBot {
    /// Configuración cargada del entorno
    config: Arc<Config>,
    /// Sesiones de reproducción por guild
    sessions: Arc<SessionRegistry<GuildId, SongbirdSink>>,
    resolver: Arc<YtDlpResolver>,
    /// Solo existe si hay credenciales de Spotify
    catalog: Option<Arc<SpotifyCatalog>>,
}

impl MusicBot {
    pub fn new(config: Config) -> Self {
        let catalog = config.spotify_credentials().map(|(client_id, client_secret)| {
            info!("🎧 Integración con Spotify activada");
            Arc::new(SpotifyCatalog::new(client_id, client_secret, config.max_playlist_size))
        });
        let resolver = YtDlpResolver::new().with_timeout(config.resolve_timeout());

        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            resolver: Arc::new(resolver),
            catalog,
        }
    }

    /// Registro compartido, usado por `main` para cerrar todo al salir
    pub fn sessions(&self) -> Arc<SessionRegistry<GuildId, SongbirdSink>> {
        self.sessions.clone()
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::listening(format!(
            "{}play",
            self.config.command_prefix
        ))));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Si alguien desconecta al bot del canal, la sesión de ese guild se cierra
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            if self.sessions.leave(&guild_id).await {
                info!("🔌 Bot desconectado en guild {}, sesión cerrada", guild_id);
            }
        }
    }
}
