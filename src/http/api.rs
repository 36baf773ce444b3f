use super::{
    AppError, X_REQUEST_ID, build_url_with_base, sanitize_body,
    signer::{OnUnauthorized, RequestSigner},
};
use crate::{APP_USER_AGENT, auth::credential::CredentialStore, config::AppConfig};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};
use ulid::Ulid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON client for the Parampara API. Cloning shares the connection pool and signer.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    signer: Arc<RequestSigner>,
}

impl ApiClient {
    /// Builds a client whose requests are signed from `store`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AppConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT.min(config.request_timeout))
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| AppError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            signer: Arc::new(RequestSigner::new(store)),
        })
    }

    #[must_use]
    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        build_url_with_base(&self.base_url, path)
    }

    /// Fetches JSON.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let builder = self.client.get(self.url(path));
        let response = self.send(builder, OnUnauthorized::Expire).await?;
        handle_json_response(response).await
    }

    /// Fetches a path and ignores the body.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    pub async fn get_empty(&self, path: &str) -> Result<(), AppError> {
        let builder = self.client.get(self.url(path));
        let response = self.send(builder, OnUnauthorized::Expire).await?;
        handle_empty_response(response).await
    }

    /// Posts JSON and parses a JSON response.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or undecodable body.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let builder = self.client.post(self.url(path)).json(body);
        let response = self.send(builder, OnUnauthorized::Expire).await?;
        handle_json_response(response).await
    }

    /// Posts to an endpoint that issues credentials. The request is signed like
    /// any other, but a `401` answers the submitted email and password, so it
    /// comes back as [`AppError::Http`] with the server's message and the stored
    /// credential is not reported as rejected.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or undecodable body.
    pub async fn exchange_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let builder = self.client.post(self.url(path)).json(body);
        let response = self.send(builder, OnUnauthorized::PassThrough).await?;
        handle_json_response(response).await
    }

    /// Puts JSON and parses a JSON response.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or undecodable body.
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let builder = self.client.put(self.url(path)).json(body);
        let response = self.send(builder, OnUnauthorized::Expire).await?;
        handle_json_response(response).await
    }

    /// Sends a DELETE and expects no meaningful body.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    pub async fn delete(&self, path: &str) -> Result<(), AppError> {
        let builder = self.client.delete(self.url(path));
        let response = self.send(builder, OnUnauthorized::Expire).await?;
        handle_empty_response(response).await
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        on_unauthorized: OnUnauthorized,
    ) -> Result<Response, AppError> {
        let request = builder
            .header(X_REQUEST_ID, Ulid::new().to_string())
            .build()
            .map_err(|err| AppError::Serialization(format!("Failed to build request: {err}")))?;

        self.signer.dispatch(&self.client, request, on_unauthorized).await
    }
}

/// Parses JSON responses and surfaces HTTP errors with sanitized bodies.
async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Parse(format!("Failed to decode response: {err}")))
    } else {
        Err(http_error(response).await)
    }
}

/// Handles empty responses and returns sanitized HTTP errors when needed.
async fn handle_empty_response(response: Response) -> Result<(), AppError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(http_error(response).await)
    }
}

async fn http_error(response: Response) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    AppError::Http {
        status,
        message: sanitize_body(&body),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::ApiClient;
    use crate::{
        APP_USER_AGENT,
        auth::credential::{Credential, MemoryCredentialStore},
        config::AppConfig,
        http::{AppError, RejectionHook},
    };
    use anyhow::Result;
    use serde_json::{Value, json};
    use std::{
        net::TcpListener,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[tokio::test]
    async fn requests_carry_agent_request_id_and_bearer() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .and(header("authorization", "Bearer T1"))
            .and(header("user-agent", APP_USER_AGENT))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["festival"])))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::new(&format!("{}/api", server.uri()));
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("T1")));
        let client = ApiClient::new(&config, store)?;

        let body: Value = client.get_json("/categories").await?;
        assert_eq!(body, json!(["festival"]));
        Ok(())
    }

    #[tokio::test]
    async fn unsigned_401_is_a_plain_http_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let config = AppConfig::new(&server.uri());
        let client = ApiClient::new(&config, Arc::new(MemoryCredentialStore::default()))?;

        let result: Result<Value, AppError> = client
            .post_json("/auth/login", &json!({"email": "a@b.com", "password": "pw"}))
            .await;
        assert_eq!(
            result.unwrap_err(),
            AppError::Http {
                status: 401,
                message: "Invalid credentials".to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn signed_401_becomes_auth_expired() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = AppConfig::new(&server.uri());
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("old")));
        let client = ApiClient::new(&config, store)?;

        let result: Result<Value, AppError> = client.get_json("/users/me/profile").await;
        assert_eq!(result.unwrap_err(), AppError::AuthExpired);
        Ok(())
    }

    #[derive(Default)]
    struct Rejections {
        count: AtomicUsize,
    }

    impl RejectionHook for Rejections {
        fn credential_rejected(&self, _credential: &Credential) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn exchange_401_is_not_reported_as_expiry() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(header("authorization", "Bearer T1"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = AppConfig::new(&server.uri());
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new("T1")));
        let client = ApiClient::new(&config, store)?;
        let rejections = Arc::new(Rejections::default());
        let hook: Arc<dyn RejectionHook> = rejections.clone();
        client.signer().set_rejection_hook(Arc::downgrade(&hook));

        let result: Result<Value, AppError> = client
            .exchange_json("/auth/login", &json!({"email": "a@b.com", "password": "pw"}))
            .await;
        assert_eq!(
            result.unwrap_err(),
            AppError::Http {
                status: 401,
                message: "Invalid credentials".to_string()
            }
        );
        assert_eq!(rejections.count.load(Ordering::SeqCst), 0);

        let result: Result<Value, AppError> = client.get_json("/users/me/profile").await;
        assert_eq!(result.unwrap_err(), AppError::AuthExpired);
        assert_eq!(rejections.count.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut config = AppConfig::new(&server.uri());
        config.request_timeout = Duration::from_millis(50);
        let client = ApiClient::new(&config, Arc::new(MemoryCredentialStore::default()))?;

        let err = client.get_empty("/health").await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)), "got {err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_network() -> Result<()> {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(_) => {
                eprintln!("Skipping test: cannot bind localhost");
                return Ok(());
            }
        };
        let port = listener.local_addr()?.port();
        drop(listener);

        let config = AppConfig::new(&format!("http://127.0.0.1:{port}"));
        let client = ApiClient::new(&config, Arc::new(MemoryCredentialStore::default()))?;

        let err = client.get_empty("/health").await.unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
        Ok(())
    }
}
