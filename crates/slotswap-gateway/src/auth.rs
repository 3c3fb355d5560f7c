use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use slotswap_types::api::Claims;
use slotswap_types::models::UserId;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing token")]
    Missing,
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Decode and validate an HS256 token, including its expiry.
pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, TokenError> {
    if token.is_empty() {
        return Err(TokenError::Missing);
    }
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn verify_token(secret: &str, token: &str) -> Result<UserId, TokenError> {
    decode_claims(secret, token).map(|claims| claims.sub)
}
