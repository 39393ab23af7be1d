//! Discord slash commands: registration and interaction handling.

use anyhow::Result;
use lastseen_commands::{
    ArgType, CommandContext, CommandDef, CommandDispatcher, CommandInvocation, CommandRegistry,
};
use lastseen_core::{CommunityId, MemberId};
use serenity::all::{
    Command, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context, CreateCommand,
    CreateCommandOption, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, EditInteractionResponse, Permissions,
};
use tracing::{info, warn};

fn option_type(arg_type: ArgType) -> CommandOptionType {
    match arg_type {
        ArgType::Integer => CommandOptionType::Integer,
        ArgType::Member => CommandOptionType::User,
    }
}

pub fn create_command(def: &CommandDef) -> CreateCommand {
    let mut command = CreateCommand::new(&def.key).description(&def.description);
    for arg in &def.args {
        let mut option = CreateCommandOption::new(option_type(arg.arg_type), &arg.name, &arg.description)
            .required(arg.required);
        if arg.arg_type == ArgType::Integer {
            option = option.min_int_value(1);
        }
        command = command.add_option(option);
    }
    if def.admin_only {
        command = command.default_member_permissions(Permissions::ADMINISTRATOR);
    }
    command
}

/// Replace the bot's global slash commands with the registry's.
pub async fn register_commands(ctx: &Context, registry: &CommandRegistry) -> Result<()> {
    let commands: Vec<CreateCommand> = registry.all().iter().map(create_command).collect();
    let registered = Command::set_global_commands(&ctx.http, commands).await?;
    info!(count = registered.len(), "Slash commands registered");
    Ok(())
}

/// Order option values by the command's argument list. Values are rendered
/// the way a text command would spell them.
pub fn invocation_from_options<'a>(
    def: &CommandDef,
    options: impl IntoIterator<Item = (&'a str, &'a CommandDataOptionValue)> + Clone,
) -> CommandInvocation {
    let mut args = Vec::new();
    for arg in &def.args {
        let value = options.clone().into_iter().find(|(name, _)| *name == arg.name).and_then(
            |(_, value)| match value {
                CommandDataOptionValue::Integer(n) => Some(n.to_string()),
                CommandDataOptionValue::User(user) => Some(user.get().to_string()),
                CommandDataOptionValue::String(s) => Some(s.clone()),
                _ => None,
            },
        );
        match value {
            Some(value) => args.push(value),
            None => break,
        }
    }
    CommandInvocation::new(def.key.clone(), args)
}

pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    dispatcher: &CommandDispatcher,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        let reply = CreateInteractionResponseMessage::new()
            .content("Commands only work inside a server.")
            .ephemeral(true);
        command
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply))
            .await?;
        return Ok(());
    };
    let Some(def) = dispatcher.registry().find(&command.data.name) else {
        warn!(command = %command.data.name, "Interaction for an unregistered command");
        return Ok(());
    };

    let options = command.data.options.iter().map(|o| (o.name.as_str(), &o.value));
    let invocation = invocation_from_options(def, options);
    let is_admin = command
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .is_some_and(|p| p.administrator());
    let context = CommandContext {
        community: CommunityId(guild_id.get()),
        invoker: MemberId(command.user.id.get()),
        is_admin,
    };

    // Kicking many members can outlast the three-second acknowledgement window.
    let defer = CreateInteractionResponseMessage::new().ephemeral(!def.public_reply);
    command
        .create_response(&ctx.http, CreateInteractionResponse::Defer(defer))
        .await?;

    let response = dispatcher.dispatch(&context, &invocation).await;
    let mut chunks = response.chunks().into_iter();
    if let Some(first) = chunks.next() {
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().content(first))
            .await?;
    }
    for chunk in chunks {
        let followup = CreateInteractionResponseFollowup::new()
            .content(chunk)
            .ephemeral(response.ephemeral);
        command.create_followup(&ctx.http, followup).await?;
    }
    Ok(())
}
