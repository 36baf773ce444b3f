//! # Parampara (session and access-control client)
//!
//! `parampara` owns the client side of authentication for the Parampara rituals
//! API: it restores a stored bearer token on start, signs every outbound request
//! with it, and gates protected views until the session is known.
//!
//! ## Session Lifecycle
//!
//! A session is `Anonymous`, `Verifying`, or `Authenticated` with a profile
//! snapshot. A handle starts in `Verifying` when a token is stored and in
//! `Anonymous` otherwise; `restore` settles it by calling `/auth/verify`.
//! `login` and `register` persist the returned token; `logout` clears it.
//!
//! ## Expiry
//!
//! The request signer attaches `Authorization: Bearer <token>` to every call.
//! A `401` on a signed request means the token is no longer accepted; the signer
//! reports it to the session, which drops back to `Anonymous` so every guard
//! re-evaluates to a redirect.
//!
//! Tokens are wrapped in `SecretString` and must never be logged.

pub mod auth;
pub mod cli;
pub mod config;
pub mod http;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
