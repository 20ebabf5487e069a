use axum::{extract::State, http::StatusCode, Json};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand_core::OsRng;
use std::sync::Arc;

use crate::{
    config::Config,
    error::AppError,
    middleware::{CurrentUser, ValidatedJson},
    models::{Claims, LoginRequest, RegisterUser, Token, User},
    repository::UserRepository,
};

pub fn issue_token(config: &Config, user_id: i64) -> Result<Token, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(config.token_ttl_minutes)).timestamp() as usize,
    };

    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))?;

    Ok(Token {
        access_token,
        token_type: "bearer".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/users/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "User created successfully", body = User),
        (status = 400, description = "Invalid input or username/email already registered")
    )
)]
pub async fn register(
    State(users): State<UserRepository>,
    ValidatedJson(payload): ValidatedJson<RegisterUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = payload.email.to_lowercase();

    if users.username_or_email_taken(&payload.username, &email).await? {
        return Err(AppError::ValidationFailed(
            "Username or email already registered".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    let user = users.create(&payload.username, &email, &password_hash).await?;
    tracing::info!(user_id = user.id, "registered user");

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    path = "/users/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = Token),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(users): State<UserRepository>,
    State(config): State<Arc<Config>>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<Token>, AppError> {
    let user = users
        .find_by_email(&payload.email.to_lowercase())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let parsed_hash = PasswordHash::new(&user.hashed_password)
        .map_err(|_| AppError::Internal("Invalid password hash in DB".to_string()))?;

    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))?;

    Ok(Json(issue_token(&config, user.id)?))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "auth",
    responses(
        (status = 200, description = "Authenticated user", body = User),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer" = [])
    )
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
