//! Authentication endpoints.
//!
//! Login and token refresh ride the plaintext bypass (they run before a
//! key can exist); the password change goes through the encrypting
//! pipeline like any other mutation. Logout is purely local: the server
//! keeps no session, so dropping the stored credentials is all there is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::transport::ApiClient;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

/// Admin account summary returned with a login.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminInfo {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Successful login/refresh payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// Account info (absent on refresh).
    #[serde(default)]
    pub user: Option<AdminInfo>,
    /// True when the account still uses the initial default password.
    #[serde(default)]
    pub is_default_password: bool,
}

/// Log in and store the returned token in the credential store.
pub async fn login(
    client: &ApiClient,
    username: &str,
    password: &str,
) -> Result<LoginResponse, ApiError> {
    let response: LoginResponse = client
        .post("/auth/login", &LoginRequest { username, password })
        .await?;
    client.credentials().set_token(&response.token);
    Ok(response)
}

/// Refresh the bearer token, storing the replacement.
pub async fn refresh(client: &ApiClient) -> Result<LoginResponse, ApiError> {
    let response: LoginResponse = client.post("/auth/refresh", &Value::Null).await?;
    client.credentials().set_token(&response.token);
    Ok(response)
}

/// Check that the held token is still accepted.
pub async fn verify(client: &ApiClient) -> Result<(), ApiError> {
    let _: Value = client.get("/auth/verify").await?;
    Ok(())
}

/// Change the account password (encrypted path).
pub async fn change_password(
    client: &ApiClient,
    old_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let _: Value = client
        .put(
            "/auth/password",
            &ChangePasswordRequest {
                old_password,
                new_password,
            },
        )
        .await?;
    Ok(())
}

/// Log out: wipe the stored token and the cached application key.
pub fn logout(client: &ApiClient) {
    client.credentials().clear_all();
    log::info!("Logged out, credentials cleared");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_deserialize() {
        let json = r#"{
            "token": "eyJabc",
            "expires_in": 86400,
            "user": {"id": 1, "username": "admin", "email": "a@b.c"},
            "is_default_password": false
        }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.token, "eyJabc");
        assert_eq!(resp.expires_in, 86_400);
        assert_eq!(resp.user.unwrap().username, "admin");
    }

    #[test]
    fn test_login_response_tolerates_minimal_shape() {
        let resp: LoginResponse = serde_json::from_str(r#"{"token": "t"}"#).unwrap();
        assert_eq!(resp.token, "t");
        assert!(resp.user.is_none());
    }
}
