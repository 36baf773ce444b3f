//! Maps parsed CLI arguments to an [`Action`]. Nothing here touches the network
//! or the credential store; that happens when the action executes.

use crate::{
    auth::types::ProfileUpdate,
    cli::{
        actions::{
            Action, health,
            session::{self, Command},
        },
        commands::{api, session as args},
    },
    config::{AppConfig, normalize_value},
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;

fn string(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .and_then(|value| normalize_value(value))
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    string(matches, id).with_context(|| format!("missing required argument: --{id}"))
}

fn password(matches: &ArgMatches) -> Option<SecretString> {
    matches
        .get_one::<String>(args::ARG_PASSWORD)
        .filter(|value| !value.is_empty())
        .map(|value| SecretString::from(value.clone()))
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if the configuration is invalid or required arguments are missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let config = AppConfig::load(api::overrides(matches)).context("invalid configuration")?;

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("missing subcommand"))?;

    let command = match name {
        args::CMD_HEALTH => return Ok(Action::Health(health::Args { config })),
        args::CMD_STATUS => Command::Status,
        args::CMD_LOGIN => Command::Login {
            email: required(sub, args::ARG_EMAIL)?,
            password: password(sub),
        },
        args::CMD_REGISTER => Command::Register {
            email: required(sub, args::ARG_EMAIL)?,
            password: password(sub),
            full_name: required(sub, args::ARG_FULL_NAME)?,
            region: required(sub, args::ARG_REGION)?,
            profile_picture_url: string(sub, args::ARG_PROFILE_PICTURE_URL),
        },
        args::CMD_LOGOUT => Command::Logout,
        args::CMD_WHOAMI => Command::Whoami {
            refresh: sub.get_flag(args::ARG_REFRESH),
        },
        args::CMD_UPDATE_PROFILE => {
            let update = ProfileUpdate {
                full_name: string(sub, args::ARG_FULL_NAME),
                email: string(sub, args::ARG_EMAIL),
                region: string(sub, args::ARG_REGION),
                profile_picture_url: string(sub, args::ARG_PROFILE_PICTURE_URL),
            };
            if update.is_empty() {
                return Err(anyhow!("nothing to update: all profile fields are blank"));
            }
            Command::UpdateProfile(update)
        }
        args::CMD_DELETE_ACCOUNT => {
            if !sub.get_flag(args::ARG_YES) {
                return Err(anyhow!("refusing to delete the account without --yes"));
            }
            Command::DeleteAccount
        }
        other => return Err(anyhow!("unknown subcommand: {other}")),
    };

    Ok(Action::Session(session::Args { config, command }))
}
