//! Request and response types for auth-related API calls. Request payloads carry
//! passwords and responses carry tokens, so neither may be logged; passwords are
//! held as `SecretString` and only exposed while serializing.

use super::credential::Credential;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

fn expose_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// Profile snapshot of the signed-in user. Replaced wholesale, never patched.
pub struct UserProfile {
    pub id: i64,
    #[serde(alias = "fullName")]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "state_name", alias = "state")]
    pub region: String,
    #[serde(
        default,
        alias = "profilePictureUrl",
        alias = "profile_pic",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_picture_url: Option<String>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(serialize_with = "expose_secret")]
    pub password: SecretString,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(serialize_with = "expose_secret")]
    pub password: SecretString,
    pub full_name: String,
    #[serde(rename = "state_name")]
    pub region: String,
    #[serde(rename = "profile_pic", skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
/// Partial profile update; absent fields are left unchanged by the server.
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "state_name", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "profile_pic", skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.region.is_none()
            && self.profile_picture_url.is_none()
    }
}

#[derive(Deserialize)]
/// Body of a successful login or registration.
pub(crate) struct AuthResponse {
    token: String,
    user: UserProfile,
}

/// Credential plus profile returned by login or registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthGrant {
    pub credential: Credential,
    pub user: UserProfile,
}

impl From<AuthResponse> for AuthGrant {
    fn from(response: AuthResponse) -> Self {
        Self {
            credential: Credential::new(response.token),
            user: response.user,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
/// Profile endpoints answer either `{ "user": {...} }` or the bare profile.
pub(crate) enum UserEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl From<UserEnvelope> for UserProfile {
    fn from(envelope: UserEnvelope) -> Self {
        match envelope {
            UserEnvelope::Wrapped { user } | UserEnvelope::Bare(user) => user,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_profile_accepts_snake_and_camel_case() {
        let snake: UserProfile = serde_json::from_value(json!({
            "id": 7,
            "full_name": "Asha Rao",
            "email": "asha@example.com",
            "state_name": "Kerala",
            "profile_pic": "https://res.cloudinary.com/p/asha.png",
            "created_at": "2024-01-02T03:04:05Z"
        }))
        .unwrap();
        let camel: UserProfile = serde_json::from_value(json!({
            "id": 7,
            "fullName": "Asha Rao",
            "email": "asha@example.com",
            "region": "Kerala",
            "profilePictureUrl": "https://res.cloudinary.com/p/asha.png",
            "createdAt": "2024-01-02T03:04:05Z"
        }))
        .unwrap();
        assert_eq!(snake, camel);
        assert_eq!(snake.region, "Kerala");
    }

    #[test]
    fn user_profile_tolerates_missing_optional_fields() {
        let user: UserProfile =
            serde_json::from_value(json!({"id": 1, "fullName": "A"})).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.full_name, "A");
        assert!(user.email.is_empty());
        assert_eq!(user.profile_picture_url, None);
    }

    #[test]
    fn register_request_uses_wire_names_and_exposes_password_only_in_json() {
        let request = RegisterRequest {
            email: "a@b.com".to_string(),
            password: SecretString::from("pw".to_string()),
            full_name: "A".to_string(),
            region: "Goa".to_string(),
            profile_picture_url: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "email": "a@b.com",
                "password": "pw",
                "full_name": "A",
                "state_name": "Goa"
            })
        );
        assert!(!format!("{request:?}").contains("\"pw\""));
    }

    #[test]
    fn profile_update_serializes_only_present_fields() {
        let update = ProfileUpdate {
            region: Some("Punjab".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"state_name": "Punjab"})
        );
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn user_envelope_unwraps_both_shapes() {
        let wrapped: UserEnvelope =
            serde_json::from_value(json!({"user": {"id": 2, "full_name": "B"}})).unwrap();
        let bare: UserEnvelope =
            serde_json::from_value(json!({"id": 2, "full_name": "B"})).unwrap();
        assert_eq!(UserProfile::from(wrapped), UserProfile::from(bare));
    }

    #[test]
    fn auth_response_becomes_grant() {
        let response: AuthResponse = serde_json::from_value(json!({
            "token": "T1",
            "user": {"id": 1, "fullName": "A"}
        }))
        .unwrap();
        let grant = AuthGrant::from(response);
        assert_eq!(grant.credential.expose(), "T1");
        assert_eq!(grant.user.full_name, "A");
    }
}
