//! # Shell Completion Module
//!
//! ```bash
//! # Generate bash completions
//! cadenza completion bash > ~/.local/share/bash-completion/completions/cadenza
//!
//! # Generate zsh completions
//! cadenza completion zsh > ~/.config/zsh/completions/_cadenza
//! ```

use crate::model::MusicModel;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Titles, artists and albums of the library, sorted and deduplicated.
#[must_use]
pub fn get_title_completions(model: &MusicModel) -> Vec<String> {
    let mut completions: Vec<String> = model
        .records()
        .flat_map(|record| [&record.title, &record.artist, &record.album])
        .filter(|text| !text.is_empty())
        .cloned()
        .collect();
    completions.sort();
    completions.dedup();
    completions
}

/// Print completions, quoting the ones with whitespace.
pub fn print_title_completions(model: &MusicModel) {
    for completion in get_title_completions(model) {
        if completion.contains(char::is_whitespace) {
            println!("\"{}\"", completion.replace('"', "\\\""));
        } else {
            println!("{completion}");
        }
    }
}
