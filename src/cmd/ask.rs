//! Terminal advice command (`boardroom ask`).

use std::collections::HashMap;

use anyhow::{Context, Result};
use boardroom::board::Boardroom;
use boardroom::config::BoardroomConfig;
use boardroom::{llm, store};

pub async fn cmd_ask(
    config: &BoardroomConfig,
    user_id: &str,
    member_id: Option<&str>,
    input: &str,
) -> Result<()> {
    let model = llm::build_provider(&config.llm).context("Failed to configure model provider")?;
    let store = store::open(config)?;
    let board = Boardroom::new(store.clone(), model);

    let names: HashMap<String, String> = store
        .list_members(user_id)
        .await
        .context("Failed to load board members")?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect();

    let records = match member_id {
        Some(member_id) => vec![board.ask_member(user_id, member_id, input).await?],
        None => board.convene(user_id, input).await?,
    };

    if records.is_empty() {
        println!("No board members found for user {}.", user_id);
        return Ok(());
    }

    for record in records {
        let name = names
            .get(&record.member_id)
            .map(String::as_str)
            .unwrap_or(&record.member_id);
        println!("── {} ──", name);
        println!("{}", record.member_output.trim());
        println!();
    }
    Ok(())
}
