//! Interactive confirmation over stdin.

use crate::domain::ports::ConfirmationGate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;

/// Prompts on stdout and reads one line from stdin. Only "yes" (or "y",
/// case-insensitive) counts as approval; anything else is a refusal.
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationGate for StdinConfirmation {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        let prompt = prompt.to_string();
        // Blocking stdin read must not stall the runtime.
        tokio::task::spawn_blocking(move || {
            print!("{prompt}");
            std::io::stdout().flush().context("Failed to flush prompt")?;
            let mut answer = String::new();
            std::io::stdin()
                .read_line(&mut answer)
                .context("Failed to read confirmation from stdin")?;
            let answer = answer.trim().to_lowercase();
            Ok(answer == "yes" || answer == "y")
        })
        .await
        .context("Confirmation task panicked")?
    }
}

/// Gate for the `--yes` flag: approves everything without prompting.
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}
