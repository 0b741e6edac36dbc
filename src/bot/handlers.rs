use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
        EditInteractionResponse, EditMessage,
    },
    http::Http,
    model::{
        application::CommandInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
        user::User,
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::downloader::Notifier,
    bot::{
        commands::{Command, Usage},
        service::{Invocation, MusicService, Reply, DOWNLOADING},
        BnssBot,
    },
    error::MusicError,
    ui::embeds,
};

/// Posts backlogged download results to the text channel the command came from.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, message: String) {
        if let Err(e) = self.channel_id.say(&self.http, message).await {
            error!("Error al notificar en canal {}: {:?}", self.channel_id, e);
        }
    }
}

enum Rendered {
    Content(String),
    Embed(CreateEmbed),
}

fn render(reply: Reply, prefix: &str) -> Rendered {
    match reply {
        Reply::Text(text) => Rendered::Content(text),
        Reply::NowPlaying(track) => Rendered::Embed(embeds::create_now_playing_embed(&track)),
        Reply::Queue(snapshot) => Rendered::Embed(embeds::create_queue_embed(&snapshot)),
        Reply::Help => Rendered::Embed(embeds::create_help_embed(prefix)),
    }
}

fn log_failure(command: &str, error: &MusicError) {
    if error.is_user_error() {
        info!("Comando {} rechazado: {}", command, error);
    } else {
        warn!("Comando {} falló: {}", command, error);
    }
}

fn invocation(ctx: &Context, guild_id: GuildId, user: &User, text_channel: ChannelId) -> Invocation {
    Invocation {
        guild_id,
        user_id: user.id,
        user_name: user.name.clone(),
        user_channel: get_user_voice_channel(ctx, guild_id, user.id),
        notifier: Arc::new(ChannelNotifier::new(ctx.http.clone(), text_channel)),
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &BnssBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let parsed = match Command::from_interaction(&command) {
        Ok(parsed) => parsed,
        Err(Usage(usage)) => return respond_ephemeral(ctx, &command, usage).await,
    };
    let invocation = invocation(ctx, guild_id, &command.user, command.channel_id);

    if let Command::Play(url) = &parsed {
        if let Err(e) = bot.service.check_play(&invocation, url).await {
            log_failure("play", &e);
            return respond_ephemeral(ctx, &command, &e.to_string()).await;
        }

        // Acknowledge before joining; connecting can outlast the interaction deadline.
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new().content(DOWNLOADING),
                ),
            )
            .await?;

        let outcome = match bot.service.start_play(&invocation, url).await {
            Ok(submission) => MusicService::finish_play(submission).await,
            Err(e) => {
                log_failure("play", &e);
                e.to_string()
            }
        };
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().content(outcome))
            .await?;
        return Ok(());
    }

    let name = parsed.name();
    match bot.service.execute(&invocation, parsed).await {
        Ok(reply) => {
            let message = match render(reply, &bot.config.command_prefix) {
                Rendered::Content(text) => CreateInteractionResponseMessage::new().content(text),
                Rendered::Embed(embed) => CreateInteractionResponseMessage::new().embed(embed),
            };
            command
                .create_response(&ctx.http, CreateInteractionResponse::Message(message))
                .await?;
            Ok(())
        }
        Err(e) => {
            log_failure(name, &e);
            respond_ephemeral(ctx, &command, &e.to_string()).await
        }
    }
}

/// Maneja comandos con prefijo en mensajes de texto
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &BnssBot) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let parsed = match Command::parse_prefixed(&msg.content, &bot.config.command_prefix) {
        None => return Ok(()),
        Some(Ok(parsed)) => parsed,
        Some(Err(Usage(usage))) => {
            msg.reply(ctx, usage).await?;
            return Ok(());
        }
    };

    info!(
        "📝 Comando {}{} usado por {} en guild {}",
        bot.config.command_prefix,
        parsed.name(),
        msg.author.name,
        guild_id
    );
    let invocation = invocation(ctx, guild_id, &msg.author, msg.channel_id);

    if let Command::Play(url) = &parsed {
        if let Err(e) = bot.service.check_play(&invocation, url).await {
            log_failure("play", &e);
            msg.reply(ctx, e.to_string()).await?;
            return Ok(());
        }

        let mut ack = msg.reply(ctx, DOWNLOADING).await?;
        let outcome = match bot.service.start_play(&invocation, url).await {
            Ok(submission) => MusicService::finish_play(submission).await,
            Err(e) => {
                log_failure("play", &e);
                e.to_string()
            }
        };
        ack.edit(ctx, EditMessage::new().content(outcome)).await?;
        return Ok(());
    }

    let name = parsed.name();
    let message = match bot.service.execute(&invocation, parsed).await {
        Ok(reply) => match render(reply, &bot.config.command_prefix) {
            Rendered::Content(text) => CreateMessage::new().content(text),
            Rendered::Embed(embed) => CreateMessage::new().embed(embed),
        },
        Err(e) => {
            log_failure(name, &e);
            CreateMessage::new().content(e.to_string())
        }
    };
    msg.channel_id
        .send_message(&ctx.http, message.reference_message(msg))
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
