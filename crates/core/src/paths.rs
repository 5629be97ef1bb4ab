use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".hono"))
            .unwrap_or_else(|| PathBuf::from(".hono"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    /// SQLite database holding groups, users, messages, reminders and the emoji catalog.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir().join("hono.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
