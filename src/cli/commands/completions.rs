//! `ostore completions <shell>`.

use crate::cli::{Cli, Shell};
use crate::error::Result;
use clap::CommandFactory;
use std::io::{self, Write};

const BIN_NAME: &str = "ostore";

impl From<&Shell> for clap_complete::Shell {
    fn from(shell: &Shell) -> Self {
        match shell {
            Shell::Bash => Self::Bash,
            Shell::Zsh => Self::Zsh,
            Shell::Fish => Self::Fish,
            Shell::PowerShell => Self::PowerShell,
            Shell::Elvish => Self::Elvish,
        }
    }
}

/// Write the completion script for `shell` to stdout.
pub fn execute(shell: &Shell) -> Result<()> {
    let mut out = io::stdout().lock();
    render(shell, &mut out);
    out.flush()?;
    Ok(())
}

fn render(shell: &Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(clap_complete::Shell::from(shell), &mut cmd, BIN_NAME, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: &Shell) -> String {
        let mut buf = Vec::new();
        render(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_script_lists_store_commands() {
        let bash = script(&Shell::Bash);
        assert!(bash.contains(BIN_NAME));
        for sub in ["init", "reset", "migrate", "query", "exec"] {
            assert!(bash.contains(sub), "missing {sub}");
        }
    }

    #[test]
    fn test_every_shell_renders() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            assert!(!script(&shell).is_empty());
        }
    }
}
