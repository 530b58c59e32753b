use serde::{Deserialize, Serialize};

use crate::auth::repo_types::User;

/// Request body for signup. Missing fields deserialize as empty strings so
/// they are reported by validation rather than by the JSON extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub phone: String,
    pub name: String,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token plus the public profile fields returned after signup or login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthData {
    pub token: String,
    pub name: String,
    pub username: String,
    pub phone: String,
}

impl AuthData {
    pub fn new(token: String, user: User) -> Self {
        Self {
            token,
            name: user.name,
            username: user.username,
            phone: user.phone,
        }
    }
}

/// `{status, message, data}` envelope used by successful auth responses.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: u16,
    pub message: &'static str,
    pub data: AuthData,
}

#[derive(Debug, Serialize)]
pub struct ProtectedResponse {
    pub msg: &'static str,
    pub user: User,
}
