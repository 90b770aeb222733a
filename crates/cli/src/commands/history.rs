//! `askgate history` — Operator access to the conversation log.

use askgate_core::message::ConversationTurn;
use askgate_pipeline::open_store;

pub async fn show(user_id: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = open_store(&config).await?;

    let turns = store.fetch_recent(user_id, limit.max(1)).await?;
    if turns.is_empty() {
        println!("No stored turns for \"{user_id}\".");
        return Ok(());
    }

    println!("History for \"{user_id}\" ({} turns, oldest first)", turns.len());
    for turn in &turns {
        println!("{}", format_turn(turn));
    }

    Ok(())
}

pub async fn forget(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = open_store(&config).await?;

    let removed = store.forget(user_id).await?;
    println!("🗑️  Deleted {removed} turn(s) for \"{user_id}\".");

    Ok(())
}

pub async fn prune() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = open_store(&config).await?;

    let removed = store.prune_expired(chrono::Utc::now()).await?;
    println!(
        "🧹 Pruned {removed} turn(s) older than {} days.",
        config.memory.retention_days
    );

    Ok(())
}

fn format_turn(turn: &ConversationTurn) -> String {
    let content: String = turn.content.chars().take(120).collect();
    let ellipsis = if turn.content.chars().count() > 120 { "…" } else { "" };
    format!(
        "  {} [{:>9}] {content}{ellipsis}",
        turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
        turn.role.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_turns_are_shortened() {
        let turn = ConversationTurn::assistant("u1", "c1", "x".repeat(300));
        let line = format_turn(&turn);
        assert!(line.contains("[assistant]"));
        assert!(line.ends_with('…'));
        assert_eq!(line.matches('x').count(), 120);
    }
}
