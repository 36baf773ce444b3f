use crate::{
    auth::credential::MemoryCredentialStore,
    config::AppConfig,
    http::{ApiClient, AppError, HEALTH_PATH},
};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: AppConfig,
}

fn describe(err: &AppError) -> String {
    if err.is_transport() {
        return format!("unreachable ({err})");
    }
    match err.status() {
        Some(status) if status >= 500 => format!("down, answered {status}"),
        Some(status) => format!("answered {status}"),
        None => err.to_string(),
    }
}

/// Call `GET /health` unsigned. Also wakes an idle backend.
///
/// # Errors
/// Returns an error if the API cannot be reached or answers with a non-2xx status.
pub async fn execute(args: Args) -> Result<()> {
    let client = ApiClient::new(&args.config, Arc::new(MemoryCredentialStore::default()))?;
    client
        .get_empty(HEALTH_PATH)
        .await
        .map_err(|err| anyhow!("API at {} is {}", args.config.api_base_url, describe(&err)))?;

    info!(api = %args.config.api_base_url, "api healthy");
    println!("API is up: {}", args.config.api_base_url);
    Ok(())
}
