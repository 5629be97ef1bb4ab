pub mod completions_cmd;
pub mod config_cmd;
pub mod emoji_cmd;
pub mod reminders_cmd;
pub mod render_cmd;
pub mod status;
pub mod tools_cmd;

use hono_core::Paths;
use hono_storage::SqliteStore;
use tracing::debug;

pub(crate) fn open_store(paths: &Paths) -> anyhow::Result<SqliteStore> {
    let path = paths.database_file();
    debug!(path = %path.display(), "Opening store");
    Ok(SqliteStore::open(&path)?)
}
