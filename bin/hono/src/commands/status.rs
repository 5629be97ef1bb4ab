use hono_core::{Config, Paths};
use hono_storage::{Directory, Store};

use super::open_store;

pub async fn run(paths: &Paths) -> anyhow::Result<()> {
    let config_path = paths.config_file();
    let config = Config::load_or_default(paths)?;

    println!("hono status");
    println!("===========");
    println!();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗ (defaults, run `hono config init`)" }
    );
    println!("Database:  {}", paths.database_file().display());
    println!();

    println!("Agent:");
    println!("  model:           {}", config.agent.model);
    println!(
        "  followup model:  {}",
        config.agent.followup_model.as_deref().unwrap_or("(same)")
    );
    println!("  max rounds:      {}", config.agent.max_rounds);
    println!("  context:         {} messages", config.agent.context_messages);
    match config.agent.owner_id {
        Some(id) => println!("  owner:           {}", id),
        None => println!("  owner:           ✗ not set"),
    }
    println!();

    println!("Providers:");
    match config.get_api_key() {
        Some((name, provider)) => println!(
            "  active:  ✓ {} ({})",
            name,
            provider.api_base.as_deref().unwrap_or("default endpoint")
        ),
        None => println!("  active:  ✗ no API key configured"),
    }
    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();
    for name in names {
        let key_set = config
            .get_provider(name)
            .map(|p| !p.api_key.is_empty())
            .unwrap_or(false);
        println!("  {:<10} {}", name, if key_set { "✓ key set" } else { "✗ no key" });
    }
    println!();

    if paths.database_file().exists() {
        let store = open_store(paths)?;
        let chats = store.list_known_chats().await?;
        let users = store.list_known_users().await?;
        let pending = store.list_reminders().await?.into_iter().filter(|r| !r.sent).count();
        let emoji = store.emoji_catalog().await?;
        println!("Storage:");
        println!("  known chats:        {}", chats.len());
        println!("  known users:        {}", users.len());
        println!("  pending reminders:  {}", pending);
        println!("  custom emoji:       {}", emoji.len());
    } else {
        println!("Storage:   ✗ no database yet");
    }

    Ok(())
}
