//! Client wrappers for the Parampara auth and profile endpoints. The session
//! state machine only talks to the API through [`AuthApi`], which keeps the
//! transport swappable in tests and keeps token handling out of callers: the
//! HTTP implementation never sees the credential, the request signer attaches it.

use super::types::{
    AuthGrant, AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, UserEnvelope,
    UserProfile,
};
use crate::http::{ApiClient, AppError};
use async_trait::async_trait;
use tracing::instrument;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const VERIFY_PATH: &str = "/auth/verify";
pub const MY_PROFILE_PATH: &str = "/users/me/profile";
pub const DELETE_ACCOUNT_PATH: &str = "/users/me/delete";

/// Remote auth contract consumed by the session state machine.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, AppError>;

    /// `POST /auth/register`.
    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, AppError>;

    /// `GET /auth/verify` with the stored credential attached.
    async fn verify(&self) -> Result<UserProfile, AppError>;

    /// `PUT /users/me/profile`.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, AppError>;

    /// `GET /users/me/profile`.
    async fn fetch_profile(&self) -> Result<UserProfile, AppError>;

    /// `DELETE /users/me/delete`.
    async fn delete_account(&self) -> Result<(), AppError>;
}

/// [`AuthApi`] over the signed JSON client.
#[derive(Clone)]
pub struct HttpAuthApi {
    api: ApiClient,
}

impl HttpAuthApi {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all, fields(email = %request.email))]
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, AppError> {
        let response: AuthResponse = self.api.exchange_json(LOGIN_PATH, request).await?;
        Ok(response.into())
    }

    #[instrument(skip_all, fields(email = %request.email))]
    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, AppError> {
        let response: AuthResponse = self.api.exchange_json(REGISTER_PATH, request).await?;
        Ok(response.into())
    }

    #[instrument(skip_all)]
    async fn verify(&self) -> Result<UserProfile, AppError> {
        let envelope: UserEnvelope = self.api.get_json(VERIFY_PATH).await?;
        Ok(envelope.into())
    }

    #[instrument(skip_all)]
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, AppError> {
        let envelope: UserEnvelope = self.api.put_json(MY_PROFILE_PATH, update).await?;
        Ok(envelope.into())
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self) -> Result<UserProfile, AppError> {
        let envelope: UserEnvelope = self.api.get_json(MY_PROFILE_PATH).await?;
        Ok(envelope.into())
    }

    #[instrument(skip_all)]
    async fn delete_account(&self) -> Result<(), AppError> {
        self.api.delete(DELETE_ACCOUNT_PATH).await
    }
}
