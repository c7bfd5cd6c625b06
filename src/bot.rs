use teloxide::dptree;
use teloxide::prelude::*;

use crate::command;
use crate::error::HandlerResult;
use crate::handler::handler_tree;
use crate::state::AppState;

pub struct BotService {
    state: AppState,
}

impl BotService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn start(&self) -> HandlerResult<()> {
        let bot = Bot::new(self.state.config.telegram.0.clone());

        info!("Testing connection to Telegram API...");
        match bot.get_me().await {
            Ok(me) => info!("Connected to Telegram API as @{}", me.username()),
            Err(e) => {
                error!("Failed to connect to Telegram API: {:?}", e);
                return Err(anyhow::anyhow!("Failed to connect to Telegram API: {}", e).into());
            }
        }

        command::setup_commands(&bot).await?;

        info!("Bot started");

        Dispatcher::builder(bot, handler_tree())
            .dependencies(dptree::deps![self.state.clone()])
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}
