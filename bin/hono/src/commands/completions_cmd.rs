use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::Cli;

pub fn run(shell: &str) -> anyhow::Result<()> {
    let shell = match shell.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "powershell" | "ps" => Shell::PowerShell,
        "elvish" => Shell::Elvish,
        _ => {
            anyhow::bail!(
                "Unsupported shell: {}. Options: bash, zsh, fish, powershell, elvish",
                shell
            );
        }
    };

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "hono", &mut std::io::stdout());

    eprintln!();
    eprintln!("# Usage:");
    match shell {
        Shell::Bash => eprintln!("#   eval \"$(hono completions bash)\""),
        Shell::Zsh => eprintln!("#   hono completions zsh > ~/.zfunc/_hono"),
        Shell::Fish => eprintln!("#   hono completions fish > ~/.config/fish/completions/hono.fish"),
        _ => {}
    }
    Ok(())
}
