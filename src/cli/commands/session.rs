use clap::{Arg, ArgAction, ArgGroup, Command};

pub const CMD_STATUS: &str = "status";
pub const CMD_LOGIN: &str = "login";
pub const CMD_REGISTER: &str = "register";
pub const CMD_LOGOUT: &str = "logout";
pub const CMD_WHOAMI: &str = "whoami";
pub const CMD_UPDATE_PROFILE: &str = "update-profile";
pub const CMD_DELETE_ACCOUNT: &str = "delete-account";
pub const CMD_HEALTH: &str = "health";

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_FULL_NAME: &str = "full-name";
pub const ARG_REGION: &str = "region";
pub const ARG_PROFILE_PICTURE_URL: &str = "profile-picture-url";
pub const ARG_REFRESH: &str = "refresh";
pub const ARG_YES: &str = "yes";

fn email(required: bool) -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long("email")
        .help("Account email address")
        .required(required)
}

fn password() -> Arg {
    Arg::new(ARG_PASSWORD)
        .long("password")
        .help("Account password; prompted on stdin when omitted")
        .env("PARAMPARA_PASSWORD")
        .hide_env_values(true)
}

fn full_name(required: bool) -> Arg {
    Arg::new(ARG_FULL_NAME)
        .long("full-name")
        .help("Full name shown on the profile")
        .required(required)
}

fn region(required: bool) -> Arg {
    Arg::new(ARG_REGION)
        .long("region")
        .help("State or region of residence")
        .required(required)
}

fn profile_picture_url() -> Arg {
    Arg::new(ARG_PROFILE_PICTURE_URL)
        .long("profile-picture-url")
        .help("URL of an already uploaded profile picture")
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand(Command::new(CMD_STATUS).about("Show the current session"))
        .subcommand(
            Command::new(CMD_LOGIN)
                .about("Sign in and store the session token")
                .arg(email(true))
                .arg(password()),
        )
        .subcommand(
            Command::new(CMD_REGISTER)
                .about("Create an account and sign in")
                .arg(email(true))
                .arg(password())
                .arg(full_name(true))
                .arg(region(true))
                .arg(profile_picture_url()),
        )
        .subcommand(Command::new(CMD_LOGOUT).about("Sign out and forget the stored token"))
        .subcommand(
            Command::new(CMD_WHOAMI)
                .about("Show the signed-in user")
                .arg(
                    Arg::new(ARG_REFRESH)
                        .long("refresh")
                        .help("Fetch the profile from the API instead of the verified snapshot")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new(CMD_UPDATE_PROFILE)
                .about("Update profile fields of the signed-in user")
                .arg(full_name(false))
                .arg(email(false))
                .arg(region(false))
                .arg(profile_picture_url())
                .group(
                    ArgGroup::new("fields")
                        .args([ARG_FULL_NAME, ARG_EMAIL, ARG_REGION, ARG_PROFILE_PICTURE_URL])
                        .required(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            Command::new(CMD_DELETE_ACCOUNT)
                .about("Delete the signed-in account")
                .arg(
                    Arg::new(ARG_YES)
                        .long("yes")
                        .help("Confirm the deletion")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new(CMD_HEALTH).about("Wake the API and check that it answers"))
}
