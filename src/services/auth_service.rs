use axum::Extension;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sea_orm::DatabaseConnection;

use crate::db::entities::user;
use crate::db::enums::UserRole;
use crate::db::services::user_service;
use crate::web::error::AppError;
use crate::web::models::{
    AuthenticatedUser, Claims, LoginRequest, LoginResponse, RegisterRequest, UserResponse,
};

const TOKEN_VALIDITY_HOURS: i64 = 24;
const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::PasswordHashingError(format!("Password hashing failed: {e}")))
}

/// Self-registration creates operator accounts; admin accounts come from
/// `seed-admin` or an existing admin.
pub async fn register_user(
    db: &DatabaseConnection,
    req: RegisterRequest,
) -> Result<UserResponse, AppError> {
    if req.username.trim().is_empty() || req.password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidInput(
            "Username must not be empty and password must be at least 8 characters.".to_string(),
        ));
    }
    let username = req.username.trim();

    if user_service::find_by_username(db, username).await?.is_some() {
        return Err(AppError::UserAlreadyExists(
            "Username is already taken.".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let created = user_service::create(db, username, &password_hash, UserRole::Operator).await?;
    Ok(UserResponse {
        id: created.id,
        username: created.username,
        role: created.role,
    })
}

pub async fn login_user(
    db: &DatabaseConnection,
    req: LoginRequest,
    jwt_secret: &str,
) -> Result<LoginResponse, AppError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Username and password must not be empty.".to_string(),
        ));
    }

    let Some(found) = user_service::find_by_username(db, &req.username).await? else {
        return Err(AppError::InvalidCredentials);
    };

    let valid_password = verify(&req.password, &found.password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?;
    if !valid_password {
        return Err(AppError::InvalidCredentials);
    }

    create_jwt_for_user(&found, jwt_secret)
}

pub fn create_jwt_for_user(
    account: &user::Model,
    jwt_secret: &str,
) -> Result<LoginResponse, AppError> {
    let expiration = (Utc::now() + Duration::hours(TOKEN_VALIDITY_HOURS)).timestamp() as usize;
    let claims = Claims {
        sub: account.username.clone(),
        user_id: account.id,
        role: account.role,
        exp: expiration,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_ref()),
    )
    .map_err(|e| AppError::TokenCreationError(format!("Token generation failed: {e}")))?;

    Ok(LoginResponse {
        token,
        user_id: account.id,
        username: account.username.clone(),
        role: account.role,
    })
}

pub async fn me(
    Extension(account): Extension<AuthenticatedUser>,
) -> Result<axum::Json<UserResponse>, AppError> {
    Ok(axum::Json(UserResponse {
        id: account.id,
        username: account.username,
        role: account.role,
    }))
}
