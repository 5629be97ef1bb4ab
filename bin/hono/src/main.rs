mod commands;

use clap::{Parser, Subcommand};
use hono_core::Paths;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hono")]
#[command(about = "A chat agent that lives in your messenger account", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and storage status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect the tools offered to the model
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Render markup the way outgoing replies are rendered
    Render {
        /// Text with **bold**, *italic*, `code` and #N emoji tags
        text: String,
    },

    /// Manage the custom emoji catalog
    Emoji {
        #[command(subcommand)]
        command: EmojiCommands,
    },

    /// Inspect scheduled reminders
    Reminders {
        #[command(subcommand)]
        command: RemindersCommands,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type: bash, zsh, fish, powershell, elvish
        shell: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Print the full config as JSON
    Show,
    /// Get a value by dot path (e.g. agent.model)
    Get { key: String },
    /// Set a value by dot path (e.g. tools.pinned_cache_secs 60)
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// List all tools
    List,
    /// Show a tool's parameters
    Info { name: String },
}

#[derive(Subcommand)]
enum EmojiCommands {
    /// Add or replace a catalog entry
    Add {
        /// Fallback glyph shown by clients without the pack
        glyph: String,
        /// Custom emoji document id
        document_id: i64,
        /// What the emoji means, shown to the model
        #[arg(default_value = "")]
        description: String,
    },
    /// List the catalog with its #N tags
    List,
    /// Remove an entry by document id
    Remove { document_id: i64 },
}

#[derive(Subcommand)]
enum RemindersCommands {
    /// List reminders
    List {
        /// Include delivered reminders
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("info"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let paths = Paths::new();

    match cli.command {
        Commands::Status => commands::status::run(&paths).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => commands::config_cmd::init(&paths, force)?,
            ConfigCommands::Show => commands::config_cmd::show(&paths)?,
            ConfigCommands::Get { key } => commands::config_cmd::get(&paths, &key)?,
            ConfigCommands::Set { key, value } => commands::config_cmd::set(&paths, &key, &value)?,
        },
        Commands::Tools { command } => match command {
            ToolsCommands::List => commands::tools_cmd::list(),
            ToolsCommands::Info { name } => commands::tools_cmd::info(&name)?,
        },
        Commands::Render { text } => commands::render_cmd::run(&paths, &text).await?,
        Commands::Emoji { command } => match command {
            EmojiCommands::Add {
                glyph,
                document_id,
                description,
            } => commands::emoji_cmd::add(&paths, &glyph, document_id, &description).await?,
            EmojiCommands::List => commands::emoji_cmd::list(&paths).await?,
            EmojiCommands::Remove { document_id } => {
                commands::emoji_cmd::remove(&paths, document_id).await?
            }
        },
        Commands::Reminders { command } => match command {
            RemindersCommands::List { all } => commands::reminders_cmd::list(&paths, all).await?,
        },
        Commands::Completions { shell } => commands::completions_cmd::run(&shell)?,
    }

    Ok(())
}
