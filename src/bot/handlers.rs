use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage, EditMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    audio::{
        session::{LoopMode, SessionController},
        skip_votes::VoteOutcome,
        songbird_sink::SongbirdSink,
    },
    bot::MusicBot,
    error::SessionError,
    sources::{
        import::{import_catalog, ImportProgress},
        spotify::CatalogRef,
        CatalogLookup, SourceResolver,
    },
    ui::embeds,
};

type GuildSession = Arc<SessionController<SongbirdSink>>;

/// Comandos de chat reconocidos, con sus argumentos ya validados
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Summon(Option<ChannelId>),
    Leave,
    Play(String),
    Volume(Option<i64>),
    Now,
    Pause,
    Resume,
    Stop,
    Skip,
    Queue(usize),
    Shuffle,
    Remove(usize),
    Loop,
    Clear,
    /// Argumentos inválidos; guarda el uso correcto
    Invalid(&'static str),
}

impl Command {
    /// Interpreta un mensaje; devuelve `None` si no es un comando conocido
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let body = content.strip_prefix(prefix)?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let name = parts.next()?;
        let args = parts.next().unwrap_or("").trim();

        let command = match name {
            "join" => Command::Join,
            "summon" if args.is_empty() => Command::Summon(None),
            "summon" => match parse_channel(args) {
                Some(channel) => Command::Summon(Some(channel)),
                None => Command::Invalid("summon [#canal | id]"),
            },
            "leave" | "disconnect" => Command::Leave,
            "play" | "p" | "P" if args.is_empty() => Command::Invalid("play <canción | URL>"),
            "play" | "p" | "P" => Command::Play(args.to_string()),
            "volume" if args.is_empty() => Command::Volume(None),
            "volume" => match args.parse() {
                Ok(percent) => Command::Volume(Some(percent)),
                Err(_) => Command::Invalid("volume <0-100>"),
            },
            "now" | "current" | "playing" => Command::Now,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "skip" | "next" => Command::Skip,
            "queue" if args.is_empty() => Command::Queue(1),
            "queue" => match args.parse() {
                Ok(page) => Command::Queue(page),
                Err(_) => Command::Invalid("queue [página]"),
            },
            "shuffle" => Command::Shuffle,
            "remove" => match args.parse::<usize>() {
                Ok(position) if position > 0 => Command::Remove(position),
                _ => Command::Invalid("remove <posición>"),
            },
            "loop" => Command::Loop,
            "clear" => Command::Clear,
            _ => return None,
        };

        Some(command)
    }
}

/// Acepta `<#123>` o `123`
fn parse_channel(arg: &str) -> Option<ChannelId> {
    let id = arg
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(arg);
    id.parse::<u64>().ok().filter(|id| *id != 0).map(ChannelId::new)
}

/// Respuesta que se envía al canal de texto
enum Reply {
    Text(String),
    Embed(CreateEmbed),
    React(char),
    Nothing,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    fn not_connected() -> Self {
        Reply::text("❌ No estoy conectado a un canal de voz")
    }
}

/// Maneja un mensaje de chat que puede contener un comando
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &MusicBot) -> Result<()> {
    let Some(command) = Command::parse(&msg.content, &bot.config.command_prefix) else {
        return Ok(());
    };

    let Some(guild_id) = msg.guild_id else {
        msg.channel_id
            .say(&ctx.http, "❌ Este comando solo funciona en un servidor")
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando {:?} usado por {} en guild {}",
        command, msg.author.name, guild_id
    );

    let reply = match run(ctx, msg, bot, guild_id, command).await {
        Ok(reply) => reply,
        Err(e) => match e.downcast_ref::<SessionError>() {
            Some(session_error) => Reply::Embed(embeds::create_error_embed(
                "No se pudo completar el comando",
                &session_error.to_string(),
            )),
            None => return Err(e),
        },
    };

    send(ctx, msg, reply).await
}

async fn run(ctx: &Context, msg: &Message, bot: &MusicBot, guild_id: GuildId, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Join => summon(ctx, msg, bot, guild_id, None).await?,
        Command::Summon(channel) => summon(ctx, msg, bot, guild_id, channel).await?,
        Command::Leave => {
            if bot.sessions.leave(&guild_id).await {
                Reply::text("👋 Desconectado del canal de voz")
            } else {
                Reply::not_connected()
            }
        }
        Command::Play(query) => play(ctx, msg, bot, guild_id, &query).await?,
        Command::Stop => {
            if bot.sessions.leave(&guild_id).await {
                Reply::React('⏹')
            } else {
                Reply::not_connected()
            }
        }
        Command::Invalid(usage) => Reply::text(format!("❌ Uso: `{}{}`", bot.config.command_prefix, usage)),
        command => {
            let Some(session) = bot.sessions.get(&guild_id) else {
                return Ok(Reply::not_connected());
            };
            control(msg, &session, command).await?
        }
    };

    Ok(reply)
}

/// Comandos que operan sobre una sesión existente
async fn control(msg: &Message, session: &GuildSession, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Volume(Some(percent)) => {
            let volume = session.set_volume_percent(percent).await?;
            Reply::Embed(embeds::create_volume_embed(volume))
        }
        Command::Volume(None) => Reply::Embed(embeds::create_volume_embed(session.volume())),
        Command::Now => match session.now_playing() {
            Some(track) => Reply::Embed(embeds::create_now_playing_embed(
                &track,
                session.loop_mode(),
                session.volume(),
            )),
            None => Reply::text("❌ No hay nada reproduciéndose ahora mismo"),
        },
        Command::Pause => {
            session.pause().await?;
            Reply::React('⏸')
        }
        Command::Resume => {
            session.resume().await?;
            Reply::React('▶')
        }
        Command::Skip => match session.skip_vote(msg.author.id)? {
            VoteOutcome::ImmediateSkip | VoteOutcome::ThresholdReached => Reply::React('⏭'),
            VoteOutcome::AlreadyVoted => Reply::text("🗳️ Ya votaste para saltar esta canción"),
            VoteOutcome::Recorded(count) => Reply::text(format!(
                "🗳️ Voto registrado, van **{}/{}**",
                count,
                session.skip_threshold()
            )),
        },
        Command::Queue(page) => Reply::Embed(embeds::create_queue_embed(
            &session.queue_page(page),
            session.now_playing().as_ref(),
            session.loop_mode(),
        )),
        Command::Shuffle => {
            session.shuffle()?;
            Reply::React('🔀')
        }
        Command::Remove(position) => match session.remove(position - 1) {
            Ok(track) => Reply::Embed(embeds::create_success_embed(
                "Eliminada de la cola",
                &format!("🗑️ **{}**", track.title),
            )),
            Err(SessionError::IndexOutOfRange { len, .. }) => Reply::text(format!(
                "❌ La posición {} no existe, la cola tiene {} canciones",
                position, len
            )),
            Err(e) => return Err(e.into()),
        },
        Command::Loop => match session.toggle_loop()? {
            LoopMode::Track => Reply::text("🔂 Repetición activada"),
            LoopMode::Off => Reply::text("▶️ Repetición desactivada"),
        },
        Command::Clear => {
            let removed = session.clear()?;
            Reply::Embed(embeds::create_success_embed(
                "Cola vaciada",
                &format!("🧹 Se eliminaron {} canciones de la cola", removed),
            ))
        }
        other => {
            warn!("Comando {:?} llegó al despachador de sesión", other);
            Reply::Nothing
        }
    };

    Ok(reply)
}

/// `join` y `summon`: conecta o mueve la sesión al canal indicado
async fn summon(
    ctx: &Context,
    msg: &Message,
    bot: &MusicBot,
    guild_id: GuildId,
    channel: Option<ChannelId>,
) -> Result<Reply> {
    let Some(channel_id) = channel.or_else(|| author_voice_channel(ctx, msg)) else {
        return Ok(Reply::text("❌ Debes estar en un canal de voz o indicar uno"));
    };

    match bot.sessions.get(&guild_id) {
        Some(session) => session.sink().move_to(channel_id).await?,
        None => {
            connect(ctx, bot, guild_id, channel_id).await?;
        }
    }

    Ok(Reply::text(format!("🔊 Conectado a <#{}>", channel_id)))
}

async fn play(ctx: &Context, msg: &Message, bot: &MusicBot, guild_id: GuildId, query: &str) -> Result<Reply> {
    let session = match bot.sessions.get(&guild_id) {
        Some(session) => session,
        None => match author_voice_channel(ctx, msg) {
            Some(channel_id) => connect(ctx, bot, guild_id, channel_id).await?,
            None => return Ok(Reply::text("❌ Debes estar en un canal de voz")),
        },
    };

    if CatalogRef::parse(query).is_some() {
        return match &bot.catalog {
            Some(catalog) if catalog.handles(query) => import_playlist(ctx, msg, bot, &session, &**catalog, query).await,
            _ => Ok(Reply::text("❌ La integración con Spotify no está configurada")),
        };
    }

    let track = bot.resolver.resolve(query, msg.author.id).await?;
    let info = track.info().clone();
    let position = session.enqueue(track)?;

    Ok(Reply::Embed(embeds::create_track_added_embed(&info, position)))
}

/// Importa una playlist mostrando el progreso en un solo mensaje
async fn import_playlist<C: CatalogLookup + ?Sized>(
    ctx: &Context,
    msg: &Message,
    bot: &MusicBot,
    session: &GuildSession,
    catalog: &C,
    reference: &str,
) -> Result<Reply> {
    let mut status = msg
        .channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new().embed(embeds::create_import_progress_embed(ImportProgress::default())),
        )
        .await?;

    let (progress_tx, mut progress_rx) = watch::channel(ImportProgress::default());
    let import = import_catalog(
        &**session,
        &*bot.resolver,
        catalog,
        reference,
        msg.author.id,
        move |progress| {
            progress_tx.send_replace(progress);
        },
    );

    let http = ctx.http.clone();
    let status_ref = &mut status;
    let updates = async move {
        // Termina cuando la importación suelta el emisor
        while progress_rx.changed().await.is_ok() {
            let progress = *progress_rx.borrow_and_update();
            let edit = EditMessage::new().embed(embeds::create_import_progress_embed(progress));
            if let Err(e) = status_ref.edit(&http, edit).await {
                warn!("⚠️ No se pudo actualizar el progreso: {}", e);
            }
        }
    };

    let (report, ()) = tokio::join!(import, updates);
    let report = report?;

    status
        .edit(
            &ctx.http,
            EditMessage::new().embed(embeds::create_import_report_embed(&report)),
        )
        .await?;

    Ok(Reply::Nothing)
}

async fn connect(ctx: &Context, bot: &MusicBot, guild_id: GuildId, channel_id: ChannelId) -> Result<GuildSession> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
    let settings = bot.config.session_settings();

    let session = bot
        .sessions
        .get_or_create(guild_id, || async move {
            let sink = SongbirdSink::connect(manager, guild_id, channel_id).await?;
            Ok(SessionController::spawn(format!("guild {guild_id}"), sink, settings))
        })
        .await?;

    Ok(session)
}

/// Canal de voz en el que está el autor del mensaje
fn author_voice_channel(ctx: &Context, msg: &Message) -> Option<ChannelId> {
    let guild = msg.guild(&ctx.cache)?;
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|state| state.channel_id)
}

async fn send(ctx: &Context, msg: &Message, reply: Reply) -> Result<()> {
    match reply {
        Reply::Text(text) => {
            msg.channel_id.say(&ctx.http, text).await?;
        }
        Reply::Embed(embed) => {
            msg.channel_id
                .send_message(&ctx.http, CreateMessage::new().embed(embed))
                .await?;
        }
        Reply::React(emoji) => {
            msg.react(&ctx.http, emoji).await?;
        }
        Reply::Nothing => {}
    }
    Ok(())
}
