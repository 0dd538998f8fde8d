//! # Shell Completion Module
//!
//! ```bash
//! # Generate bash completions
//! wshuffle completion bash > ~/.local/share/bash-completion/completions/wshuffle
//!
//! # Generate zsh completions
//! wshuffle completion zsh > ~/.config/zsh/completions/_wshuffle
//! ```

use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

/// Generate shell completions for the given shell into `out`
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Generate shell completions on stdout
pub fn print_completions(shell: crate::cli::Shell, cmd: &mut Command) {
    generate_completions(shell_to_completion_shell(shell), cmd, &mut io::stdout());
}

pub fn shell_to_completion_shell(shell: crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}
