use std::time::Instant;

use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode, User};

use crate::command::Command;
use crate::error::HandlerResult;
use crate::service::{RateDecision, RedeemOutcome};
use crate::state::AppState;
use crate::storage::{Plan, UserRecord};
use crate::utils::full_name;

const MSG_GREETING: &str = "Hi! Send me /ai followed by your prompt to generate an image, \
    /ask followed by your query to get an answer, /dev to get developer info, \
    or /help to get all commands info.";
const MSG_DEV: &str = "Developer @AkhandanandTripathi";
const MSG_NOT_OWNER: &str = "You don't have permission to use this command.";
const MSG_NOT_PROFESSIONAL: &str = "You need to redeem a gift code to use the /proai command.";
const MSG_IMAGE_FAILED: &str = "Sorry, there was an error generating the image. Please try again later.";
const MSG_ANSWER_FAILED: &str = "Sorry, there was an error generating the answer. Please try again later.";
const MSG_SOMETHING_WRONG: &str = "Sorry, something went wrong. Please try again later.";
const MSG_NO_IMAGE: &str = "No image found to modify. Please generate an image first using /ai \
    command or reply to an image with /modify command.";
const MSG_REDEEMED: &str = "You have successfully redeemed the code and upgraded to the professional plan.";
const MSG_CODE_INVALID: &str = "Invalid or already redeemed gift code.";
const MSG_BATCH_CANCELLING: &str = "Cancelling the image batch in progress.";
const MSG_BATCH_CANCELLED: &str = "Image batch cancelled.";
const MSG_BROADCAST_SENT: &str = "Broadcast message sent.";

pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, state: AppState) -> HandlerResult<()> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };

    match cmd {
        Command::Start => handle_start(bot, msg, state, user).await,
        Command::Help => handle_help(bot, msg, state, user).await,
        Command::Ai(prompt) => handle_ai(bot, msg, state, user, prompt).await,
        Command::Proai(prompt) => handle_proai(bot, msg, state, user, prompt).await,
        Command::Modify(prompt) => handle_modify(bot, msg, state, user, prompt).await,
        Command::Ask(query) => handle_ask(bot, msg, state, user, query).await,
        Command::Dev => handle_dev(bot, msg, state, user).await,
        Command::Setlogchannel(args) => handle_set_log_channel(bot, msg, state, user, args).await,
        Command::Ping => handle_ping(bot, msg, state, user).await,
        Command::Generate => handle_generate(bot, msg, state, user).await,
        Command::Redeem(args) => handle_redeem(bot, msg, state, user, args).await,
        Command::Users => handle_users(bot, msg, state, user).await,
        Command::Broadcast(message) => handle_broadcast(bot, msg, state, user, message).await,
    }
}

/// Sends the reply and mirrors the exchange to the audit channel.
async fn reply_mirrored(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    user: &User,
    text: &str,
) -> HandlerResult<()> {
    bot.send_message(msg.chat.id, text).await?;
    state
        .audit
        .mirror(bot, user, msg.text().unwrap_or_default(), text)
        .await;
    Ok(())
}

async fn handle_start(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    reply_mirrored(&bot, &msg, &state, &user, MSG_GREETING).await?;

    let record = UserRecord {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        full_name: full_name(&user),
    };
    if let Err(e) = state.store.upsert_user(&record).await {
        error!("Failed to upsert user {}: {}", record.user_id, e);
    }

    Ok(())
}

async fn handle_help(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    use teloxide::utils::command::BotCommands;
    reply_mirrored(&bot, &msg, &state, &user, &Command::descriptions().to_string()).await
}

async fn handle_ai(bot: Bot, msg: Message, state: AppState, user: User, prompt: String) -> HandlerResult<()> {
    let user_id = user.id.0 as i64;

    // The cooldown arms before the prompt check, so an argument-less /ai
    // still counts as a use.
    if let RateDecision::Denied { .. } = state.entitlement.check_and_record_ai_use(user_id, Instant::now()) {
        let text = format!(
            "Please wait for {} seconds before using the /ai command again.",
            state.entitlement.cooldown().as_secs()
        );
        return reply_mirrored(&bot, &msg, &state, &user, &text).await;
    }

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return reply_mirrored(&bot, &msg, &state, &user, "Please provide a prompt after the /ai command.").await;
    }

    bot.send_message(msg.chat.id, "Generating image...").await?;

    match state.genai.generate_image(prompt).await {
        Some(url) => {
            bot.send_photo(msg.chat.id, InputFile::url(url.parse()?)).await?;
            state.entitlement.record_last_image(user_id, url.clone());
            state.audit.mirror(&bot, &user, msg.text().unwrap_or_default(), &url).await;
        }
        None => {
            reply_mirrored(&bot, &msg, &state, &user, MSG_IMAGE_FAILED).await?;
        }
    }

    Ok(())
}

async fn handle_proai(bot: Bot, msg: Message, state: AppState, user: User, prompt: String) -> HandlerResult<()> {
    let user_id = user.id.0 as i64;

    match state.entitlement.is_professional(user_id).await {
        Ok(true) => {}
        Ok(false) => {
            return reply_mirrored(&bot, &msg, &state, &user, MSG_NOT_PROFESSIONAL).await;
        }
        Err(e) => {
            error!("Failed to read subscription for {}: {}", user_id, e);
            return reply_mirrored(&bot, &msg, &state, &user, MSG_SOMETHING_WRONG).await;
        }
    }

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return reply_mirrored(&bot, &msg, &state, &user, "Please provide a prompt after the /proai command.").await;
    }

    let Some(batch) = state.entitlement.begin_batch(user_id) else {
        bot.send_message(msg.chat.id, MSG_BATCH_CANCELLING).await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, "Generating images...").await?;

    let count = state.config.limits.proai_batch_count;
    for i in 0..count {
        if batch.cancelled() {
            bot.send_message(msg.chat.id, MSG_BATCH_CANCELLED).await?;
            break;
        }

        let batch_prompt = format!("{} (image {} improving each time)", prompt, i + 1);
        match state.genai.generate_image(&batch_prompt).await {
            Some(url) => {
                bot.send_photo(msg.chat.id, InputFile::url(url.parse()?)).await?;
                state.audit.mirror(&bot, &user, msg.text().unwrap_or_default(), &url).await;
            }
            None => {
                reply_mirrored(&bot, &msg, &state, &user, MSG_IMAGE_FAILED).await?;
                break;
            }
        }

        if i + 1 < count {
            tokio::time::sleep(state.config.limits.proai_delay).await;
        }
    }

    Ok(())
}

async fn handle_modify(bot: Bot, msg: Message, state: AppState, user: User, prompt: String) -> HandlerResult<()> {
    let user_id = user.id.0 as i64;
    let prompt = prompt.trim();

    let replied_photo = msg
        .reply_to_message()
        .and_then(|reply| reply.photo())
        .and_then(|sizes| sizes.last());

    if let Some(photo) = replied_photo {
        if prompt.is_empty() {
            return reply_mirrored(&bot, &msg, &state, &user, "Please provide a prompt after the /modify command.")
                .await;
        }

        let file = match bot.get_file(photo.file.id.clone()).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to resolve replied photo: {}", e);
                return reply_mirrored(&bot, &msg, &state, &user, MSG_IMAGE_FAILED).await;
            }
        };
        let file_url = format!("https://api.telegram.org/file/bot{}/{}", bot.token(), file.path);

        bot.send_message(msg.chat.id, "Modifying the image...").await?;

        match state
            .genai
            .generate_image(&format!("Modify this image: {} with {}", file_url, prompt))
            .await
        {
            Some(url) => {
                bot.send_photo(msg.chat.id, InputFile::url(url.parse()?)).await?;
                state.audit.mirror(&bot, &user, msg.text().unwrap_or_default(), &url).await;
            }
            None => {
                reply_mirrored(&bot, &msg, &state, &user, MSG_IMAGE_FAILED).await?;
            }
        }

        return Ok(());
    }

    if let Some(last_url) = state.entitlement.last_image(user_id) {
        if prompt.is_empty() {
            return reply_mirrored(&bot, &msg, &state, &user, "Please provide a prompt after the /modify command.")
                .await;
        }

        bot.send_message(msg.chat.id, "Modifying the last generated image...").await?;

        match state
            .genai
            .generate_image(&format!("Modify this image: {} with {}", last_url, prompt))
            .await
        {
            Some(url) => {
                bot.send_photo(msg.chat.id, InputFile::url(url.parse()?)).await?;
                state.entitlement.record_last_image(user_id, url.clone());
                state.audit.mirror(&bot, &user, msg.text().unwrap_or_default(), &url).await;
            }
            None => {
                reply_mirrored(&bot, &msg, &state, &user, MSG_IMAGE_FAILED).await?;
            }
        }

        return Ok(());
    }

    reply_mirrored(&bot, &msg, &state, &user, MSG_NO_IMAGE).await
}

async fn handle_ask(bot: Bot, msg: Message, state: AppState, user: User, query: String) -> HandlerResult<()> {
    let query = query.trim();
    if query.is_empty() {
        return reply_mirrored(&bot, &msg, &state, &user, "Please provide a query after the /ask command.").await;
    }

    bot.send_message(msg.chat.id, "Thinking...").await?;

    match state.genai.ask_question(query).await {
        Some(answer) => reply_mirrored(&bot, &msg, &state, &user, &answer).await,
        None => reply_mirrored(&bot, &msg, &state, &user, MSG_ANSWER_FAILED).await,
    }
}

async fn handle_dev(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    reply_mirrored(&bot, &msg, &state, &user, MSG_DEV).await
}

async fn handle_set_log_channel(
    bot: Bot,
    msg: Message,
    state: AppState,
    user: User,
    args: String,
) -> HandlerResult<()> {
    if !state.config.access.is_owner(user.id) {
        return reply_mirrored(&bot, &msg, &state, &user, MSG_NOT_OWNER).await;
    }

    let parts: Vec<&str> = args.split_whitespace().collect();
    let channel = match parts.as_slice() {
        [raw] => raw.parse::<i64>().ok().map(ChatId),
        _ => None,
    };

    match channel {
        Some(channel) => {
            state.audit.set_channel(channel).await;
            let text = format!("Log channel set to {}", channel);
            reply_mirrored(&bot, &msg, &state, &user, &text).await
        }
        None => reply_mirrored(&bot, &msg, &state, &user, "Usage: /setlogchannel <log_channel_id>").await,
    }
}

async fn handle_ping(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    let start = Instant::now();
    bot.send_message(msg.chat.id, "Pong!").await?;
    let elapsed = start.elapsed();

    let text = format!("Pong! {} ms", elapsed.as_millis());
    reply_mirrored(&bot, &msg, &state, &user, &text).await
}

async fn handle_generate(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    if !state.config.access.is_owner(user.id) {
        return reply_mirrored(&bot, &msg, &state, &user, MSG_NOT_OWNER).await;
    }

    match state.entitlement.issue_code(Plan::Professional).await {
        Ok(code) => {
            let text = format!("Generated gift code: {}", code);
            reply_mirrored(&bot, &msg, &state, &user, &text).await
        }
        Err(e) => {
            error!("Failed to issue gift code: {}", e);
            reply_mirrored(&bot, &msg, &state, &user, MSG_SOMETHING_WRONG).await
        }
    }
}

async fn handle_redeem(bot: Bot, msg: Message, state: AppState, user: User, args: String) -> HandlerResult<()> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [code] = parts.as_slice() else {
        return reply_mirrored(&bot, &msg, &state, &user, "Usage: /redeem <gift_code>").await;
    };

    match state.entitlement.redeem(code, user.id.0 as i64).await {
        Ok(RedeemOutcome::Upgraded(_)) => reply_mirrored(&bot, &msg, &state, &user, MSG_REDEEMED).await,
        Ok(RedeemOutcome::InvalidOrUsed) => reply_mirrored(&bot, &msg, &state, &user, MSG_CODE_INVALID).await,
        Err(e) => {
            error!("Failed to redeem gift code: {}", e);
            reply_mirrored(&bot, &msg, &state, &user, MSG_SOMETHING_WRONG).await
        }
    }
}

async fn handle_users(bot: Bot, msg: Message, state: AppState, user: User) -> HandlerResult<()> {
    if !state.config.access.is_owner(user.id) {
        return reply_mirrored(&bot, &msg, &state, &user, MSG_NOT_OWNER).await;
    }

    let users = match state.store.list_users().await {
        Ok(users) => users,
        Err(e) => {
            error!("Failed to list users: {}", e);
            return reply_mirrored(&bot, &msg, &state, &user, MSG_SOMETHING_WRONG).await;
        }
    };

    for record in &users {
        let info = format!(
            "<b>User ID:</b> {id}\n<b>Username:</b> @{username}\n<b>Name:</b> {name}\n\
             <b>Permanent Link:</b> <a href=\"tg://user?id={id}\">Open Chat</a>",
            id = record.user_id,
            username = record.username.as_deref().unwrap_or("none"),
            name = record.full_name,
        );
        bot.send_message(msg.chat.id, info).parse_mode(ParseMode::Html).await?;
    }

    state
        .audit
        .mirror(
            &bot,
            &user,
            msg.text().unwrap_or_default(),
            &format!("Listed {} users", users.len()),
        )
        .await;

    Ok(())
}

async fn handle_broadcast(bot: Bot, msg: Message, state: AppState, user: User, message: String) -> HandlerResult<()> {
    if !state.config.access.is_owner(user.id) {
        return reply_mirrored(&bot, &msg, &state, &user, MSG_NOT_OWNER).await;
    }

    let message = message.trim();
    if message.is_empty() {
        return reply_mirrored(&bot, &msg, &state, &user, "Usage: /broadcast <message>").await;
    }

    let (users, groups) = match (state.store.list_users().await, state.store.list_groups().await) {
        (Ok(users), Ok(groups)) => (users, groups),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to list broadcast recipients: {}", e);
            return reply_mirrored(&bot, &msg, &state, &user, MSG_SOMETHING_WRONG).await;
        }
    };

    // One failed recipient must not abort the fan-out.
    for record in users {
        if let Err(e) = bot.send_message(ChatId(record.user_id), message).await {
            error!("Error sending message to {}: {}", record.user_id, e);
        }
    }
    for record in groups {
        if let Err(e) = bot.send_message(ChatId(record.group_id), message).await {
            error!("Error sending message to {}: {}", record.group_id, e);
        }
    }

    reply_mirrored(&bot, &msg, &state, &user, MSG_BROADCAST_SENT).await
}
