//! Session and access control for the Parampara client.
//!
//! - [`credential`] persists the one session token.
//! - [`client`] wraps the auth and profile endpoints.
//! - [`state`] owns the session and is its only writer.
//! - [`guards`] turns the session into render/redirect decisions.

pub mod client;
pub mod credential;
pub mod guards;
pub mod state;
pub mod types;

pub use client::{AuthApi, HttpAuthApi};
pub use credential::{
    Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError,
};
pub use guards::{GuardDecision, RequireAuth, decide};
pub use state::{
    ProfileUpdateOutcome, ProfileUpdatePolicy, Session, SessionError, SessionHandle,
    SessionStatus, SessionWatch,
};
pub use types::{AuthGrant, LoginRequest, ProfileUpdate, RegisterRequest, UserProfile};
