use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{queue::QueuePage, session::LoopMode, track::TrackInfo},
    sources::import::{ImportProgress, ImportReport},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Player";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackInfo, loop_mode: LoopMode, volume: f32) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("{} Reproduciendo Ahora", loop_icon(loop_mode)))
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("🔊 Volumen", format!("{}%", percent(volume)), true);

    if let Some(url) = &track.url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &TrackInfo, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("📍 Posición", position.to_string(), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true);

    if let Some(url) = &track.url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente si no hay música sonando"))
}

/// Crea un embed con una página de la cola
pub fn create_queue_embed(page: &QueuePage, current: Option<&TrackInfo>, loop_mode: LoopMode) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field(
            format!("{} Reproduciendo", loop_icon(loop_mode)),
            format!("**{}**", current.title),
            false,
        );
    }

    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if page.is_empty() {
        embed = embed.description(format!(
            "La página {} no existe, hay {} páginas",
            page.current_page, page.total_pages
        ));
    } else {
        embed = embed.field("Próximas canciones", queue_lines(page), false);
    }

    let mut info = format!("**Total:** {} canciones", page.total_items);
    let known: Duration = page.items.iter().filter_map(|t| t.duration).sum();
    if known > Duration::ZERO {
        info.push_str(&format!(" • {} en esta página", humantime::format_duration(known)));
    }

    embed
        .field("📊 Información", info, false)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {}",
            page.current_page, page.total_pages, STANDARD_FOOTER
        )))
        .timestamp(Timestamp::now())
}

/// Progreso de una importación de playlist
pub fn create_import_progress_embed(progress: ImportProgress) -> CreateEmbed {
    CreateEmbed::default()
        .title("⏳ Importando Playlist")
        .description(format!(
            "{}\n{} de {} canciones procesadas",
            progress_bar(progress.done(), progress.total),
            progress.done(),
            progress.total
        ))
        .field("✅ Agregadas", progress.added.to_string(), true)
        .field("❌ Fallidas", progress.failed.to_string(), true)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Resumen final de una importación
pub fn create_import_report_embed(report: &ImportReport) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Importada")
        .description(format!(
            "Se agregaron **{}** de **{}** canciones a la cola",
            report.added.len(),
            report.total
        ))
        .color(if report.failed.is_empty() {
            colors::SUCCESS_GREEN
        } else {
            colors::WARNING_ORANGE
        });

    if !report.failed.is_empty() {
        let mut failed: Vec<String> = report
            .failed
            .iter()
            .take(5)
            .map(|(query, _)| format!("• {query}"))
            .collect();
        if report.failed.len() > 5 {
            failed.push(format!("… y {} más", report.failed.len() - 5));
        }
        embed = embed.field("❌ No encontradas", failed.join("\n"), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume: f32) -> CreateEmbed {
    let volume_percent = percent(volume);
    let status_emoji = match volume_percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", volume_percent))
        .field("📊 Nivel", create_volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn loop_icon(loop_mode: LoopMode) -> &'static str {
    match loop_mode {
        LoopMode::Track => "🔂",
        LoopMode::Off => "▶️",
    }
}

fn percent(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

/// Líneas numeradas de una página, con la posición real en la cola
fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let duration = item
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!("**{}**. {}{}\n", page.first_position + i, item.title, duration)
        })
        .collect()
}

/// Crea una barra visual de volumen
fn create_volume_bar(volume: f32) -> String {
    progress_bar(percent(volume) as usize, 100)
}

fn progress_bar(done: usize, total: usize) -> String {
    let segments = 20;
    let filled = if total == 0 { 0 } else { (done.min(total) * segments) / total };
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
