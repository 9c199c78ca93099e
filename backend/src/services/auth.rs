//! Authentication service for operator login and token management
//!
//! The backend runs with a single operator account defined in configuration;
//! there is no user table. Login verifies the bcrypt hash from config and
//! issues a JWT the auth middleware validates on every protected route.

use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    admin_email: String,
    admin_password_hash: String,
    jwt_secret: String,
    access_token_expiry: i64,
}

/// Login request payload
#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Operator ID
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(config: &Config) -> Self {
        Self {
            admin_email: config.admin.email.clone(),
            admin_password_hash: config.admin.password_hash.clone(),
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
        }
    }

    /// Authenticate the operator account and issue tokens
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        // Login is disabled until an operator hash is configured
        if self.admin_password_hash.is_empty() {
            return Err(AppError::InvalidCredentials);
        }

        if !email.eq_ignore_ascii_case(&self.admin_email) {
            return Err(AppError::InvalidCredentials);
        }

        let valid = verify(password, &self.admin_password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        self.generate_tokens()
    }

    /// Validate a JWT and return its claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;

        Ok(token_data.claims)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            // Stable operator id derived from the configured email
            sub: Uuid::new_v5(&Uuid::NAMESPACE_OID, self.admin_email.as_bytes()).to_string(),
            email: self.admin_email.clone(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (simple random token)
        let refresh_token = Uuid::new_v4().to_string();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }
}
