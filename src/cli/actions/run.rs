use crate::cli::actions::{Action, health, session};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Health(args) => health::execute(args).await,
        Action::Session(args) => session::execute(args).await,
    }
}
