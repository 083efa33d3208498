use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use parley_types::api::Claims;

/// Issue a signed identity assertion for `username`.
///
/// HS256 over the process-wide secret. Tokens carry no `exp` and there is
/// no revocation — holders stay authenticated indefinitely. That is the
/// observed contract of this system, kept as-is rather than silently
/// tightened; see DESIGN.md.
pub fn issue(secret: &str, username: &str) -> Result<String> {
    let claims = Claims {
        sub: username.to_string(),
        iat: chrono::Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a token's signature and return its claims.
///
/// Rejects anything not signed with `secret`; the embedded `sub` becomes
/// the request principal.
pub fn verify(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // No expiry claim on our tokens
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    Ok(data.claims)
}
