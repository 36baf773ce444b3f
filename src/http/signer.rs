//! Request signing and expiry interception. Every request the client sends goes
//! through [`RequestSigner::dispatch`], which attaches the stored credential as a
//! bearer token and turns a `401` on a signed request into [`AppError::AuthExpired`].
//! The credential is copied into the header verbatim and the header is marked
//! sensitive so it never shows up in debug output.

use super::{errors::AppError, map_request_error};
use crate::auth::credential::{Credential, CredentialStore};
use reqwest::{
    Client, Request, Response, StatusCode,
    header::{AUTHORIZATION, HeaderValue},
};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

/// Receives credentials the API refused so the owner of the session can react.
pub trait RejectionHook: Send + Sync {
    fn credential_rejected(&self, credential: &Credential);
}

/// Adds `Authorization: Bearer <credential>` to `request`.
/// Without a credential the request is returned unmodified.
///
/// # Errors
/// Returns an error if the credential contains bytes not allowed in a header value.
pub fn sign(mut request: Request, credential: Option<&Credential>) -> Result<Request, AppError> {
    if let Some(credential) = credential {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| {
                AppError::Serialization("Stored credential is not a valid header value.".to_string())
            })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

/// How [`RequestSigner::dispatch`] treats a `401` on a signed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnUnauthorized {
    /// The bearer was refused: report it and fail with [`AppError::AuthExpired`].
    Expire,
    /// The endpoint judged the request body, not the bearer (sign-in with a
    /// wrong password). The response is returned as is.
    PassThrough,
}

pub struct RequestSigner {
    store: Arc<dyn CredentialStore>,
    hook: OnceLock<Weak<dyn RejectionHook>>,
}

impl RequestSigner {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            hook: OnceLock::new(),
        }
    }

    /// Registers the receiver of rejected credentials. Only the first hook is kept.
    pub fn set_rejection_hook(&self, hook: Weak<dyn RejectionHook>) {
        if self.hook.set(hook).is_err() {
            warn!("rejection hook already registered; ignoring");
        }
    }

    /// Reads the current credential. A store that cannot be read counts as empty.
    fn current(&self) -> Option<Credential> {
        match self.store.get() {
            Ok(credential) => credential,
            Err(err) => {
                warn!("credential store unreadable, sending request unsigned: {err}");
                None
            }
        }
    }

    /// Signs `request` with the current credential, sends it, and intercepts `401`
    /// on signed requests unless `on_unauthorized` is [`OnUnauthorized::PassThrough`].
    ///
    /// # Errors
    /// Returns `AuthExpired` when a signed request is rejected, or a transport error.
    pub async fn dispatch(
        &self,
        client: &Client,
        request: Request,
        on_unauthorized: OnUnauthorized,
    ) -> Result<Response, AppError> {
        let credential = self.current();
        let request = sign(request, credential.as_ref())?;

        let method = request.method().clone();
        let path = request.url().path().to_string();
        let response = client.execute(request).await.map_err(map_request_error)?;

        debug!(
            %method,
            %path,
            status = response.status().as_u16(),
            signed = credential.is_some(),
            "api response"
        );

        if response.status() == StatusCode::UNAUTHORIZED
            && on_unauthorized == OnUnauthorized::Expire
            && let Some(credential) = credential
        {
            warn!(%method, %path, "signed request rejected with 401");
            self.reject(&credential);
            return Err(AppError::AuthExpired);
        }

        Ok(response)
    }

    fn reject(&self, credential: &Credential) {
        if let Some(hook) = self.hook.get().and_then(Weak::upgrade) {
            hook.credential_rejected(credential);
        }
    }
}
