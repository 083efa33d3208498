use serde::{Deserialize, Serialize};

use crate::models::{MessageDetail, User};

// -- JWT Claims --

/// JWT claims shared between token issuance and the auth middleware.
/// Canonical definition lives here in parley-types to eliminate duplication.
///
/// There is deliberately no `exp`: tokens do not expire and cannot be
/// revoked. Verification disables expiry validation to match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated username — the principal for every message operation.
    pub sub: String,
    pub iat: i64,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub to_username: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: MessageDetail,
}
