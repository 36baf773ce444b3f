use crate::{auth::state::ProfileUpdatePolicy, config::Overrides};
use clap::{Arg, ArgMatches, Command, builder::ValueParser};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_CREDENTIAL_DIR: &str = "credential-dir";
pub const ARG_TIMEOUT_SECONDS: &str = "timeout-seconds";
pub const ARG_PROFILE_UPDATE_POLICY: &str = "profile-update-policy";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Base URL of the Parampara API, example: https://parampara.example/api")
                .env("PARAMPARA_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_CREDENTIAL_DIR)
                .long("credential-dir")
                .help("Directory holding the session token (default: <config dir>/parampara)")
                .env("PARAMPARA_CREDENTIAL_DIR")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_SECONDS)
                .long("timeout-seconds")
                .help("Request timeout in seconds")
                .env("PARAMPARA_TIMEOUT_SECONDS")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_PROFILE_UPDATE_POLICY)
                .long("profile-update-policy")
                .help("Session handling after a profile update: keep or logout (default: logout)")
                .env("PARAMPARA_PROFILE_UPDATE_POLICY")
                .global(true)
                .value_parser(ValueParser::from(|value: &str| {
                    value.parse::<ProfileUpdatePolicy>()
                })),
        )
}

/// Collect configuration overrides from the matches.
#[must_use]
pub fn overrides(matches: &ArgMatches) -> Overrides {
    Overrides {
        api_base_url: matches.get_one::<String>(ARG_API_URL).cloned(),
        credential_dir: matches.get_one::<String>(ARG_CREDENTIAL_DIR).cloned(),
        timeout_seconds: matches.get_one::<u64>(ARG_TIMEOUT_SECONDS).copied(),
        profile_update_policy: matches
            .get_one::<ProfileUpdatePolicy>(ARG_PROFILE_UPDATE_POLICY)
            .copied(),
    }
}
