use chrono::{DateTime, Utc};
use hono_core::Paths;
use hono_storage::{Reminder, Store};

use super::open_store;

pub async fn list(paths: &Paths, all: bool) -> anyhow::Result<()> {
    if !paths.database_file().exists() {
        println!("No reminders yet.");
        return Ok(());
    }
    let reminders: Vec<Reminder> = open_store(paths)?
        .list_reminders()
        .await?
        .into_iter()
        .filter(|r| all || !r.sent)
        .collect();

    if reminders.is_empty() {
        println!("No {}reminders.", if all { "" } else { "pending " });
        return Ok(());
    }
    println!("{:<6} {:<20} {:<16} {:<6} TEXT", "ID", "DUE (UTC)", "DESTINATION", "SENT");
    for r in &reminders {
        println!(
            "{:<6} {:<20} {:<16} {:<6} {}",
            r.id,
            format_ts(r.due_at),
            destination(r),
            if r.sent { "yes" } else { "no" },
            r.text
        );
    }
    Ok(())
}

fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn destination(r: &Reminder) -> String {
    match (r.chat_id, r.target.as_deref()) {
        (0, Some(target)) => target.to_string(),
        (0, None) => "-".to_string(),
        (chat, _) => chat.to_string(),
    }
}
