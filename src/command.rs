use teloxide::{macros::BotCommands, prelude::Requester, utils::command::BotCommands as _, Bot};

use crate::error::HandlerResult;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show this help message")]
    Help,
    #[command(description = "Generate an image based on the prompt")]
    Ai(String),
    #[command(description = "Generate a batch of images (professional plan)")]
    Proai(String),
    #[command(description = "Modify the last generated image")]
    Modify(String),
    #[command(description = "Get an answer to your query")]
    Ask(String),
    #[command(description = "Get developer info")]
    Dev,
    #[command(description = "Set the log channel (owner only)")]
    Setlogchannel(String),
    #[command(description = "Check the server response time")]
    Ping,
    #[command(description = "Generate a gift code (owner only)")]
    Generate,
    #[command(description = "Redeem a gift code to get the professional plan")]
    Redeem(String),
    #[command(description = "Get the list of users (owner only)")]
    Users,
    #[command(description = "Broadcast a message to all users and groups (owner only)")]
    Broadcast(String),
}

pub async fn setup_commands(bot: &Bot) -> HandlerResult<()> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}
