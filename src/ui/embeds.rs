use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{queue::QueueSnapshot, track::TrackInfo};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 bnss";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title))
        .url(&track.url)
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", format_duration(track.duration), true)
        .field("👤 Requested by", &track.requested_by, true)
        .field("🕒 Added", format!("<t:{}:R>", track.added_at.timestamp()), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        let status = if snapshot.loop_enabled { "🔂" } else { "▶️" };
        embed = embed.field(
            format!("{} Playing", status),
            format!("**[{}]({})** `[{}]`", current.title, current.url, format_duration(current.duration)),
            false,
        );
        if let Some(thumbnail) = &current.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }
    }

    if !snapshot.upcoming.is_empty() {
        let description: String = snapshot
            .upcoming
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "**{}**. [{}]({}) `[{}]` • {}\n",
                    i + 1,
                    item.title,
                    item.url,
                    format_duration(item.duration),
                    item.requested_by
                )
            })
            .collect();
        embed = embed.field("Up next", description, false);
    }

    let info = format!(
        "**Total:** {}/{} songs • **Duration:** {} • **Volume:** {}%{}",
        snapshot.len(),
        snapshot.capacity,
        format_duration(snapshot.total_duration()),
        snapshot.volume,
        if snapshot.loop_enabled { " • 🔂 **Loop**" } else { "" }
    );

    embed
        .field("Info", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 bnss - Commands")
        .color(colors::MUSIC_PURPLE)
        .description(format!(
            "Every command works as a slash command or with the `{}` prefix.",
            prefix
        ))
        .field(
            "🔊 Voice",
            format!(
                "• `{p}join [channel]` - Join your voice channel\n\
                • `{p}leave` - Leave the voice channel\n\
                • `{p}volume <0-100>` - Change the volume",
                p = prefix
            ),
            false,
        )
        .field(
            "🎵 Playback",
            format!(
                "• `{p}play <url>` - Play a YouTube link\n\
                • `{p}pause` / `{p}resume` - Pause or resume\n\
                • `{p}skip` - Skip the current song\n\
                • `{p}stop` - Stop and clear the queue\n\
                • `{p}loop` - Toggle looping the current song",
                p = prefix
            ),
            false,
        )
        .field(
            "📜 Queue",
            format!(
                "• `{p}queue` - Show the queue\n\
                • `{p}playing` - Show the current song",
                p = prefix
            ),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(600)), "10:00");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");
    }
}
