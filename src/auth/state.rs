//! Session state machine. A [`SessionHandle`] is the only writer of the session
//! value and of the credential store; everything else reads the session through
//! a watch subscription and reacts to changes instead of polling.
//!
//! Transitions that talk to the API (`restore`, `login`, `register`) are
//! serialized by an in-flight flag: a second one started while the first is
//! pending fails with [`SessionError::Busy`]. Each commit checks the session
//! epoch under the control lock, and `logout` bumps the epoch, so a sign-in that
//! resolves after a logout is discarded instead of resurrecting the session.
//! Transitions run on spawned tasks; dropping the caller's future does not
//! cancel them.

use super::{
    client::{AuthApi, HttpAuthApi},
    credential::{Credential, CredentialStore, FileCredentialStore, StoreError},
    types::{AuthGrant, LoginRequest, ProfileUpdate, RegisterRequest, UserProfile},
};
use crate::{
    config::AppConfig,
    http::{ApiClient, AppError, RejectionHook, RequestSigner},
};
use regex::Regex;
use secrecy::SecretString;
use std::{
    fmt,
    future::Future,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinError};
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Verifying,
    Authenticated(UserProfile),
}

impl Session {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Verifying => SessionStatus::Verifying,
            Self::Authenticated(_) => SessionStatus::Authenticated,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Anonymous | Self::Verifying => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Verifying,
    Authenticated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Anonymous => "anonymous",
            Self::Verifying => "verifying",
            Self::Authenticated => "authenticated",
        })
    }
}

/// What happens to the session after a successful profile update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProfileUpdatePolicy {
    /// Keep the session and adopt the updated profile.
    Keep,
    /// Sign out; the API revokes the credential when the profile changes.
    #[default]
    Logout,
}

impl FromStr for ProfileUpdatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "logout" => Ok(Self::Logout),
            other => Err(format!(
                "invalid profile update policy: {other} (expected keep or logout)"
            )),
        }
    }
}

impl fmt::Display for ProfileUpdatePolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Keep => "keep",
            Self::Logout => "logout",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileUpdateOutcome {
    /// The session continues with the new snapshot.
    Updated(UserProfile),
    /// The update succeeded and the session was closed.
    SignedOut(UserProfile),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("{0}")]
    Validation(String),
    #[error("Session expired, please sign in again")]
    AuthExpired,
    #[error("Another sign-in is already in progress")]
    Busy,
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Signed out while the request was pending")]
    Superseded,
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Protocol(String),
    #[error("Credential storage failed: {0}")]
    Storage(String),
    #[error("Session task failed: {0}")]
    Interrupted(String),
}

impl SessionError {
    fn from_transport(err: AppError) -> Self {
        match err {
            AppError::Network(message) | AppError::Timeout(message) => Self::Network(message),
            AppError::AuthExpired => Self::AuthExpired,
            AppError::Http { status, message } => Self::Server { status, message },
            AppError::Parse(message)
            | AppError::Serialization(message)
            | AppError::Config(message) => Self::Protocol(message),
        }
    }

    fn from_login(err: AppError) -> Self {
        match err {
            AppError::Http {
                status: 400 | 401 | 403 | 404,
                message,
            } => Self::InvalidCredentials(message),
            other => Self::from_transport(other),
        }
    }

    fn from_register(err: AppError) -> Self {
        match err {
            AppError::Http {
                status: 400 | 409 | 422,
                message,
            } => Self::Validation(message),
            other => Self::from_transport(other),
        }
    }

    fn from_profile(err: AppError) -> Self {
        match err {
            AppError::Http { status: 401, .. } => Self::AuthExpired,
            AppError::Http {
                status: 400 | 409 | 422,
                message,
            } => Self::Validation(message),
            other => Self::from_transport(other),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<JoinError> for SessionError {
    fn from(err: JoinError) -> Self {
        Self::Interrupted(err.to_string())
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Runs a transition on its own task so it completes even if the caller goes away.
async fn detached<T: Send + 'static>(
    task: impl Future<Output = Result<T, SessionError>> + Send + 'static,
) -> Result<T, SessionError> {
    tokio::spawn(task).await?
}

/// Reactive read-only view of the session.
#[derive(Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<Session>,
}

impl SessionWatch {
    #[must_use]
    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.rx.borrow().status()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.rx.borrow().user().cloned()
    }

    /// Waits for the next change. Returns `None` once every handle is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[derive(Default)]
struct Control {
    epoch: u64,
    in_flight: bool,
    /// Credential refused while a sign-in transition was pending.
    rejected: Option<Credential>,
}

struct Inner {
    session: watch::Sender<Session>,
    control: Mutex<Control>,
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn AuthApi>,
    policy: ProfileUpdatePolicy,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Publishes `next`, notifying subscribers only on an actual change.
    fn set_session(&self, next: Session) {
        self.session.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn begin(self: &Arc<Self>) -> Result<Transition, SessionError> {
        let mut control = self.control();
        if control.in_flight {
            return Err(SessionError::Busy);
        }
        control.in_flight = true;
        Ok(Transition {
            inner: Arc::clone(self),
            epoch: control.epoch,
        })
    }

    /// Drops the credential and the session. Never fails; storage errors are logged.
    fn reset(&self, control: &mut Control) {
        control.epoch = control.epoch.wrapping_add(1);
        if let Err(err) = self.store.clear() {
            warn!("failed to clear stored credential: {err}");
        }
        self.set_session(Session::Anonymous);
    }

    fn authenticated_epoch(&self) -> Result<u64, SessionError> {
        let control = self.control();
        if self.session.borrow().is_authenticated() {
            Ok(control.epoch)
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }

    #[instrument(skip_all)]
    async fn update_profile(
        self: Arc<Self>,
        epoch: u64,
        update: ProfileUpdate,
    ) -> Result<ProfileUpdateOutcome, SessionError> {
        let user = self
            .api
            .update_profile(&update)
            .await
            .map_err(SessionError::from_profile)?;

        let mut control = self.control();
        if control.epoch != epoch {
            return Err(SessionError::Superseded);
        }

        match self.policy {
            ProfileUpdatePolicy::Keep => {
                info!(user_id = user.id, "profile updated");
                self.set_session(Session::Authenticated(user.clone()));
                Ok(ProfileUpdateOutcome::Updated(user))
            }
            ProfileUpdatePolicy::Logout => {
                info!(user_id = user.id, "profile updated, credential invalidated; signing out");
                self.reset(&mut control);
                Ok(ProfileUpdateOutcome::SignedOut(user))
            }
        }
    }

    #[instrument(skip_all)]
    async fn refresh_profile(self: Arc<Self>, epoch: u64) -> Result<UserProfile, SessionError> {
        let user = self
            .api
            .fetch_profile()
            .await
            .map_err(SessionError::from_profile)?;

        let control = self.control();
        if control.epoch != epoch {
            return Err(SessionError::Superseded);
        }
        self.set_session(Session::Authenticated(user.clone()));
        Ok(user)
    }

    #[instrument(skip_all)]
    async fn delete_account(self: Arc<Self>, epoch: u64) -> Result<(), SessionError> {
        self.api
            .delete_account()
            .await
            .map_err(SessionError::from_profile)?;

        let mut control = self.control();
        if control.epoch == epoch {
            info!("account deleted; signing out");
            self.reset(&mut control);
        }
        Ok(())
    }

    /// Signs out if the session still runs on `credential`.
    fn expire(&self, control: &mut Control, credential: &Credential) {
        if !self.session.borrow().is_authenticated() {
            return;
        }
        if let Ok(Some(current)) = self.store.get()
            && current != *credential
        {
            debug!("rejected credential was already replaced");
            return;
        }

        warn!("credential rejected by the API; signing out");
        self.reset(control);
    }
}

impl RejectionHook for Inner {
    fn credential_rejected(&self, credential: &Credential) {
        let mut control = self.control();
        if control.in_flight {
            debug!("credential rejected during a sign-in transition; deferred until it ends");
            control.rejected = Some(credential.clone());
            return;
        }
        self.expire(&mut control, credential);
    }
}

/// Exclusive right to run one sign-in transition. Releases the flag on drop.
/// A rejection recorded meanwhile is applied then, unless a commit or a logout
/// moved the epoch.
struct Transition {
    inner: Arc<Inner>,
    epoch: u64,
}

impl Drop for Transition {
    fn drop(&mut self) {
        let mut control = self.inner.control();
        control.in_flight = false;
        if let Some(rejected) = control.rejected.take()
            && control.epoch == self.epoch
        {
            self.inner.expire(&mut control, &rejected);
        }
    }
}

impl Transition {
    #[instrument(skip_all)]
    async fn restore(self) -> Result<Session, SessionError> {
        let stored = self.inner.store.get().unwrap_or_else(|err| {
            warn!("credential store unreadable, treating as empty: {err}");
            None
        });

        {
            let control = self.inner.control();
            if control.epoch != self.epoch {
                return Ok(self.inner.snapshot());
            }
            if stored.is_none() {
                debug!("no stored credential");
                self.inner.set_session(Session::Anonymous);
                return Ok(Session::Anonymous);
            }
            self.inner.set_session(Session::Verifying);
        }

        let outcome = self.inner.api.verify().await;

        let mut control = self.inner.control();
        if control.epoch != self.epoch {
            debug!("restore finished after logout; discarding result");
            return Ok(self.inner.snapshot());
        }
        match outcome {
            Ok(user) => {
                info!(user_id = user.id, "session restored");
                self.inner.set_session(Session::Authenticated(user));
            }
            Err(err) => {
                warn!("stored credential not accepted, signing out: {err}");
                self.inner.reset(&mut control);
            }
        }
        Ok(self.inner.snapshot())
    }

    #[instrument(skip_all, fields(email = %request.email))]
    async fn login(self, request: LoginRequest) -> Result<UserProfile, SessionError> {
        let grant = self
            .inner
            .api
            .login(&request)
            .await
            .map_err(SessionError::from_login)?;
        self.commit(grant)
    }

    #[instrument(skip_all, fields(email = %request.email))]
    async fn register(self, request: RegisterRequest) -> Result<UserProfile, SessionError> {
        let grant = self
            .inner
            .api
            .register(&request)
            .await
            .map_err(SessionError::from_register)?;
        self.commit(grant)
    }

    fn commit(&self, grant: AuthGrant) -> Result<UserProfile, SessionError> {
        let mut control = self.inner.control();
        if control.epoch != self.epoch {
            warn!("sign-in finished after logout; discarding credential");
            return Err(SessionError::Superseded);
        }

        self.inner.store.set(&grant.credential)?;
        control.epoch = control.epoch.wrapping_add(1);
        info!(user_id = grant.user.id, "signed in");
        self.inner
            .set_session(Session::Authenticated(grant.user.clone()));
        Ok(grant.user)
    }
}

/// Process-wide session owner. Clones share the same state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

impl SessionHandle {
    /// Builds a handle over `store` and `api`. The initial state is `Verifying`
    /// when a credential is stored so guards wait for [`Self::restore`].
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn AuthApi>,
        policy: ProfileUpdatePolicy,
    ) -> Self {
        let initial = match store.get() {
            Ok(Some(_)) => Session::Verifying,
            Ok(None) => Session::Anonymous,
            Err(err) => {
                warn!("credential store unreadable, starting anonymous: {err}");
                Session::Anonymous
            }
        };
        let (session, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                session,
                control: Mutex::new(Control::default()),
                store,
                api,
                policy,
            }),
        }
    }

    /// Builds the HTTP stack with the file store from `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(&config.credential_dir));
        Self::with_store(config, store)
    }

    /// Builds the HTTP stack over an explicit store and wires expiry handling.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_store(config: &AppConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AppError> {
        let client = ApiClient::new(config, Arc::clone(&store))?;
        let handle = Self::new(
            store,
            Arc::new(HttpAuthApi::new(client.clone())),
            config.profile_update_policy,
        );
        handle.attach(client.signer());
        Ok(handle)
    }

    /// Routes `401`s seen by `signer` into this session.
    pub fn attach(&self, signer: &RequestSigner) {
        let hook: Arc<dyn RejectionHook> = self.inner.clone();
        signer.set_rejection_hook(Arc::downgrade(&hook));
    }

    #[must_use]
    pub fn current(&self) -> Session {
        self.inner.snapshot()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.session.borrow().status()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.session.borrow().user().cloned()
    }

    #[must_use]
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            rx: self.receiver(),
        }
    }

    pub(crate) fn receiver(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Settles the start-up state from the stored credential.
    ///
    /// # Errors
    /// Only [`SessionError::Busy`] when another sign-in transition is pending.
    pub async fn restore(&self) -> Result<Session, SessionError> {
        let transition = self.inner.begin()?;
        detached(transition.restore()).await
    }

    /// # Errors
    /// `InvalidCredentials`, `Network`, `Busy`, or `Superseded` when a logout won the race.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserProfile, SessionError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.clone(),
        };
        let transition = self.inner.begin()?;
        detached(transition.login(request)).await
    }

    /// # Errors
    /// `Validation` (malformed email or rejected by the server), `Network`, `Busy`,
    /// or `Superseded`.
    pub async fn register(&self, mut request: RegisterRequest) -> Result<UserProfile, SessionError> {
        request.email = request.email.trim().to_string();
        if !valid_email(&request.email) {
            return Err(SessionError::Validation("Invalid email address.".to_string()));
        }
        let transition = self.inner.begin()?;
        detached(transition.register(request)).await
    }

    /// Clears the credential and the session. Never suspends, never fails.
    pub fn logout(&self) {
        let mut control = self.inner.control();
        self.inner.reset(&mut control);
        info!("signed out");
    }

    /// # Errors
    /// `NotAuthenticated`, `Validation`, `AuthExpired` (the session is already
    /// closed), `Network`, or `Superseded`.
    pub async fn update_profile(
        &self,
        update: ProfileUpdate,
    ) -> Result<ProfileUpdateOutcome, SessionError> {
        if update.is_empty() {
            return Err(SessionError::Validation("Nothing to update.".to_string()));
        }
        let epoch = self.inner.authenticated_epoch()?;
        detached(Arc::clone(&self.inner).update_profile(epoch, update)).await
    }

    /// Re-reads the profile of the signed-in user.
    ///
    /// # Errors
    /// `NotAuthenticated`, `AuthExpired`, `Network`, or `Superseded`.
    pub async fn refresh_profile(&self) -> Result<UserProfile, SessionError> {
        let epoch = self.inner.authenticated_epoch()?;
        detached(Arc::clone(&self.inner).refresh_profile(epoch)).await
    }

    /// Deletes the account and signs out.
    ///
    /// # Errors
    /// `NotAuthenticated`, `AuthExpired`, or `Network`.
    pub async fn delete_account(&self) -> Result<(), SessionError> {
        let epoch = self.inner.authenticated_epoch()?;
        detached(Arc::clone(&self.inner).delete_account(epoch)).await
    }
}
