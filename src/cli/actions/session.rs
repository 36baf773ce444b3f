use crate::{
    auth::{
        guards::{GuardDecision, RequireAuth},
        state::{ProfileUpdateOutcome, SessionHandle},
        types::{ProfileUpdate, RegisterRequest, UserProfile},
    },
    config::AppConfig,
};
use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use std::io::{self, Write};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub config: AppConfig,
    pub command: Command,
}

#[derive(Debug)]
pub enum Command {
    Status,
    Login {
        email: String,
        password: Option<SecretString>,
    },
    Register {
        email: String,
        password: Option<SecretString>,
        full_name: String,
        region: String,
        profile_picture_url: Option<String>,
    },
    Logout,
    Whoami {
        refresh: bool,
    },
    UpdateProfile(ProfileUpdate),
    DeleteAccount,
}

fn prompt_password() -> Result<SecretString> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("password is required");
    }
    Ok(SecretString::from(password.to_string()))
}

fn print_profile(user: &UserProfile) {
    println!("id:        {}", user.id);
    println!("name:      {}", user.full_name);
    println!("email:     {}", user.email);
    if !user.region.is_empty() {
        println!("region:    {}", user.region);
    }
    if let Some(url) = &user.profile_picture_url {
        println!("picture:   {url}");
    }
    if let Some(created_at) = &user.created_at {
        println!("joined:    {created_at}");
    }
}

/// Gate a protected command the way a protected view is gated.
async fn require_auth(session: &SessionHandle, login_path: &str) -> Result<()> {
    let mut guard = RequireAuth::new(session).with_login_path(login_path);
    match guard.settled().await {
        GuardDecision::Render => Ok(()),
        GuardDecision::Redirect { to } => {
            debug!(redirect = %to, "protected command without a session");
            Err(anyhow!("not signed in; run `parampara login` first"))
        }
        GuardDecision::Pending => Err(anyhow!("session is still being verified")),
    }
}

/// Execute a session command against the configured API.
///
/// # Errors
/// Returns an error if the command fails or requires a session that does not exist.
pub async fn execute(args: Args) -> Result<()> {
    let Args { config, command } = args;

    // Passwords are read before any network call.
    let command = match command {
        Command::Login {
            email,
            password: None,
        } => Command::Login {
            email,
            password: Some(prompt_password()?),
        },
        Command::Register {
            email,
            password: None,
            full_name,
            region,
            profile_picture_url,
        } => Command::Register {
            email,
            password: Some(prompt_password()?),
            full_name,
            region,
            profile_picture_url,
        },
        other => other,
    };

    let session = SessionHandle::connect(&config).context("failed to build API client")?;

    if !matches!(command, Command::Logout) {
        session.restore().await?;
    }

    match command {
        Command::Status => match session.user() {
            Some(user) => println!("Signed in as {} <{}>", user.full_name, user.email),
            None => println!("Not signed in"),
        },
        Command::Login { email, password } => {
            let password = password.context("password is required")?;
            let user = session.login(&email, &password).await?;
            println!("Signed in as {} <{}>", user.full_name, user.email);
        }
        Command::Register {
            email,
            password,
            full_name,
            region,
            profile_picture_url,
        } => {
            let request = RegisterRequest {
                email,
                password: password.context("password is required")?,
                full_name,
                region,
                profile_picture_url,
            };
            let user = session.register(request).await?;
            println!("Welcome, {}! You are signed in.", user.full_name);
        }
        Command::Whoami { refresh } => {
            require_auth(&session, &config.login_path).await?;
            let user = if refresh {
                session.refresh_profile().await?
            } else {
                session.user().context("session ended unexpectedly")?
            };
            print_profile(&user);
        }
        Command::UpdateProfile(update) => {
            require_auth(&session, &config.login_path).await?;
            match session.update_profile(update).await? {
                ProfileUpdateOutcome::Updated(user) => {
                    println!("Profile updated");
                    print_profile(&user);
                }
                ProfileUpdateOutcome::SignedOut(user) => {
                    println!("Profile updated");
                    print_profile(&user);
                    println!("Signed out; run `parampara login` to continue");
                }
            }
        }
        Command::DeleteAccount => {
            require_auth(&session, &config.login_path).await?;
            session.delete_account().await?;
            println!("Account deleted");
        }
        Command::Logout => {
            session.logout();
            println!("Signed out");
        }
    }

    Ok(())
}
