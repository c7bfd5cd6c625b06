use teloxide::prelude::*;

use crate::error::HandlerResult;
use crate::state::AppState;
use crate::storage::GroupRecord;

pub async fn handle_new_chat_members(msg: Message, state: AppState) -> HandlerResult<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return Ok(());
    }

    let group = GroupRecord {
        group_id: msg.chat.id.0,
        title: msg.chat.title().unwrap_or_default().to_string(),
    };

    match state.store.upsert_group(&group).await {
        Ok(()) => info!("Added to group: {}", group.title),
        Err(e) => error!("Failed to record group {}: {}", group.group_id, e),
    }

    Ok(())
}
