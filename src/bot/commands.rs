use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{CommandDataOption, CommandInteraction, CommandOptionType},
        channel::ChannelType,
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};

/// A parsed command, identical for slash and prefix invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(Option<ChannelId>),
    Leave,
    Play(String),
    Pause,
    Resume,
    Stop,
    Skip,
    Loop,
    Queue,
    Volume(i64),
    Playing,
    Help,
}

/// Usage hint sent back when arguments are missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage(pub &'static str);

impl Command {
    /// Parses `<prefix><name> [args]`. Returns `None` for messages that are
    /// not addressed to the bot or name an unknown command.
    pub fn parse_prefixed(content: &str, prefix: &str) -> Option<Result<Self, Usage>> {
        let rest = content.trim().strip_prefix(prefix)?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_ascii_lowercase();
        let arg = parts.next();

        let command = match name.as_str() {
            "join" => match arg {
                None => Ok(Self::Join(None)),
                Some(raw) => parse_channel(raw)
                    .map(|c| Self::Join(Some(c)))
                    .ok_or(Usage("Usage: join [#channel]")),
            },
            "leave" => Ok(Self::Leave),
            "play" => arg
                .map(|url| Self::Play(url.to_string()))
                .ok_or(Usage("Usage: play <url>")),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "skip" => Ok(Self::Skip),
            "loop" => Ok(Self::Loop),
            "queue" => Ok(Self::Queue),
            "volume" => arg
                .and_then(|v| v.parse().ok())
                .map(Self::Volume)
                .ok_or(Usage("Usage: volume <0-100>")),
            "playing" => Ok(Self::Playing),
            "help" => Ok(Self::Help),
            _ => return None,
        };
        Some(command)
    }

    pub fn from_interaction(command: &CommandInteraction) -> Result<Self, Usage> {
        let options = &command.data.options;
        match command.data.name.as_str() {
            "join" => Ok(Self::Join(
                option(options, "channel").and_then(|o| o.value.as_channel_id()),
            )),
            "leave" => Ok(Self::Leave),
            "play" => option(options, "url")
                .and_then(|o| o.value.as_str())
                .map(|url| Self::Play(url.to_string()))
                .ok_or(Usage("Usage: /play <url>")),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "skip" => Ok(Self::Skip),
            "loop" => Ok(Self::Loop),
            "queue" => Ok(Self::Queue),
            "volume" => option(options, "volume")
                .and_then(|o| o.value.as_i64())
                .map(Self::Volume)
                .ok_or(Usage("Usage: /volume <0-100>")),
            "playing" => Ok(Self::Playing),
            "help" => Ok(Self::Help),
            _ => Err(Usage("Unknown command.")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave => "leave",
            Self::Play(_) => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Skip => "skip",
            Self::Loop => "loop",
            Self::Queue => "queue",
            Self::Volume(_) => "volume",
            Self::Playing => "playing",
            Self::Help => "help",
        }
    }
}

fn option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a CommandDataOption> {
    options.iter().find(|opt| opt.name == name)
}

/// Accepts a channel mention (`<#123>`) or a bare id.
fn parse_channel(raw: &str) -> Option<ChannelId> {
    let id = raw
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw);
    id.parse::<u64>().ok().filter(|id| *id != 0).map(ChannelId::new)
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in definitions() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, definitions()).await?;
    Ok(())
}

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        join_command(),
        CreateCommand::new("leave").description("Leave the voice channel"),
        play_command(),
        CreateCommand::new("pause").description("Pause the current song"),
        CreateCommand::new("resume").description("Resume the paused song"),
        CreateCommand::new("stop").description("Stop playback and clear the queue"),
        CreateCommand::new("skip").description("Skip the current song"),
        CreateCommand::new("loop").description("Toggle looping of the current song"),
        CreateCommand::new("queue").description("Show the queue"),
        volume_command(),
        CreateCommand::new("playing").description("Show the song being played"),
        CreateCommand::new("help").description("List the available commands"),
    ]
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Join your voice channel, or the given one")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Voice channel to join")
                .channel_types(vec![ChannelType::Voice, ChannelType::Stage]),
        )
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Download a YouTube video and add it to the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "url",
                "https://www.youtube.com/watch?v=... link",
            )
            .required(true),
        )
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Change the player volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "volume", "Volume from 0 to 100")
                .min_int_value(0)
                .max_int_value(100)
                .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> Option<Result<Command, Usage>> {
        Command::parse_prefixed(content, "!")
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("!leave"), Some(Ok(Command::Leave)));
        assert_eq!(parse("  !SKIP  "), Some(Ok(Command::Skip)));
        assert_eq!(parse("!playing"), Some(Ok(Command::Playing)));
        assert_eq!(parse("!help extra words"), Some(Ok(Command::Help)));
    }

    #[test]
    fn test_parse_ignores_foreign_messages() {
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse("!"), None);
        assert_eq!(parse("!dance"), None);
        assert_eq!(Command::parse_prefixed("?play x", "!"), None);
    }

    #[test]
    fn test_parse_play_and_volume_arguments() {
        assert_eq!(
            parse("!play https://www.youtube.com/watch?v=abc"),
            Some(Ok(Command::Play("https://www.youtube.com/watch?v=abc".into())))
        );
        assert_eq!(parse("!play"), Some(Err(Usage("Usage: play <url>"))));
        assert_eq!(parse("!volume 55"), Some(Ok(Command::Volume(55))));
        assert_eq!(parse("!volume -3"), Some(Ok(Command::Volume(-3))));
        assert_eq!(parse("!volume loud"), Some(Err(Usage("Usage: volume <0-100>"))));
    }

    #[test]
    fn test_parse_join_channel() {
        assert_eq!(parse("!join"), Some(Ok(Command::Join(None))));
        assert_eq!(
            parse("!join <#1234>"),
            Some(Ok(Command::Join(Some(ChannelId::new(1234)))))
        );
        assert_eq!(
            parse("!join 99"),
            Some(Ok(Command::Join(Some(ChannelId::new(99)))))
        );
        assert_eq!(parse("!join general"), Some(Err(Usage("Usage: join [#channel]"))));
        assert_eq!(parse("!join 0"), Some(Err(Usage("Usage: join [#channel]"))));
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(Command::parse_prefixed("bn!queue", "bn!"), Some(Ok(Command::Queue)));
    }

    #[test]
    fn test_every_command_is_registered() {
        assert_eq!(definitions().len(), 12);
    }
}
