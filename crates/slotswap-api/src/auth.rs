use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use slotswap_db::Database;
use slotswap_db::models::NewUser;
use slotswap_gateway::{ChatRelay, Dispatcher, Notifier};
use slotswap_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use slotswap_types::models::UserId;

use crate::error::ApiError;
use crate::service::SwapService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub notifier: Notifier,
    pub chat: ChatRelay,
    pub swaps: SwapService,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("Username must be 3-32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    // Check if username is taken
    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let display_name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&req.username);

    let user_id = state.db.create_user(&NewUser {
        username: &req.username,
        email: req.email.as_deref(),
        password_hash: &password_hash,
        display_name,
    })?;

    let token = create_token(&state.jwt_secret, user_id, &req.username)?;
    info!("Registered user {} ({})", req.username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash is invalid: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: UserId, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use slotswap_gateway::rooms::ChatPolicy;

    use crate::mailing::MailingListGateway;
    use crate::service::SwapPolicy;

    pub const SECRET: &str = "router-test-secret";

    /// In-memory state with mailing disabled.
    pub fn state_with(chat_policy: ChatPolicy) -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let notifier = Notifier::new(db.clone(), dispatcher.clone());
        let chat = ChatRelay::new(db.clone(), dispatcher.clone(), notifier.clone(), chat_policy);
        let swaps = SwapService::new(
            db.clone(),
            dispatcher.clone(),
            notifier.clone(),
            MailingListGateway::noop(),
            SwapPolicy::default(),
        );
        Arc::new(AppStateInner {
            db,
            jwt_secret: SECRET.into(),
            dispatcher,
            notifier,
            chat,
            swaps,
        })
    }

    pub fn state() -> AppState {
        state_with(ChatPolicy::PartnersOnly)
    }

    /// Creates a user and returns (id, bearer token).
    pub fn seed_user(state: &AppState, name: &str) -> (UserId, String) {
        let id = state
            .db
            .create_user(&NewUser {
                username: name,
                email: None,
                password_hash: "x",
                display_name: name,
            })
            .unwrap();
        (id, create_token(SECRET, id, name).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotswap_gateway::auth::verify_token;

    #[test]
    fn issued_tokens_verify() {
        let token = create_token("s3cret", 17, "ann").unwrap();
        assert_eq!(verify_token("s3cret", &token).unwrap(), 17);
        assert!(verify_token("other", &token).is_err());
    }
}
