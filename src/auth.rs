// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Wallet sign-in and session tokens.
//!
//! A client asks for a nonce, signs `Sign in to Sentrix: <nonce>` with its
//! wallet and trades the signature for an HS256 JWT. Protected handlers take
//! an [`AuthUser`] argument, which rejects requests without a valid bearer
//! token.

use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{NonceResponse, User, VerifyResponse};
use crate::nonce::NonceStore;
use crate::store::Store;
use crate::wallet;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub wallet: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Clone)]
pub struct AuthService {
    nonces: Arc<dyn NonceStore>,
    store: Store,
    jwt_secret: Arc<str>,
    jwt_ttl: Duration,
    nonce_ttl: Duration,
}

impl AuthService {
    pub fn new(
        nonces: Arc<dyn NonceStore>,
        store: Store,
        jwt_secret: &str,
        jwt_ttl: Duration,
        nonce_ttl: Duration,
    ) -> Self {
        Self {
            nonces,
            store,
            jwt_secret: Arc::from(jwt_secret),
            jwt_ttl,
            nonce_ttl,
        }
    }

    /// Generate and remember a nonce for `wallet`, replacing any earlier one.
    pub async fn issue_nonce(&self, wallet: &str) -> Result<NonceResponse, AppError> {
        let address = wallet::normalize_address(wallet)?;
        let nonce = wallet::generate_nonce();

        self.nonces
            .put(&address, nonce.clone(), self.nonce_ttl)
            .await?;
        tracing::debug!(wallet = %address, "issued sign-in nonce");

        Ok(NonceResponse {
            message: wallet::auth_message(&nonce),
            nonce,
        })
    }

    /// Check the signed nonce and open a session for the wallet.
    pub async fn verify(&self, wallet: &str, signature: &str) -> Result<VerifyResponse, AppError> {
        let address = wallet::normalize_address(wallet)?;
        if !is_signature_shaped(signature) {
            return Err(AppError::bad_request("signature must be 0x followed by 130 hex characters"));
        }

        let Some(nonce) = self.nonces.take_if_valid(&address).await? else {
            return Err(AppError::unauthorized(
                "nonce not found or expired, request a new nonce",
            ));
        };

        let message = wallet::auth_message(&nonce);
        if !wallet::verify_wallet_signature(&message, signature, &address) {
            tracing::warn!(wallet = %address, "signature does not match wallet");
            return Err(AppError::unauthorized("invalid signature"));
        }

        let user = self.upsert_user(&address).await?;
        let token = self.issue_token(&user)?;
        tracing::info!(wallet = %address, user_id = %user.id, "wallet signed in");

        Ok(VerifyResponse { token, user })
    }

    pub async fn user_by_wallet(&self, wallet: &str) -> Result<Option<User>, AppError> {
        let address = wallet.to_ascii_lowercase();
        let users = self
            .store
            .find_many(|u: &User| u.wallet_address == address)
            .await?;
        Ok(users.into_iter().min_by_key(|u| u.created_at))
    }

    async fn upsert_user(&self, address: &str) -> Result<User, AppError> {
        if let Some(user) = self.user_by_wallet(address).await? {
            return Ok(user);
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_address: address.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert(&user).await?;
        Ok(user)
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = Claims {
            sub: user.id.clone(),
            wallet: user.wallet_address.clone(),
            iat: now,
            exp: now + self.jwt_ttl.as_secs() as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::internal("failed to sign session token", e))
    }

    /// Validate JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "rejected session token");
            AppError::unauthorized("Unauthorized - Invalid or missing token")
        })?;

        Ok(token_data.claims)
    }

    pub async fn purge_expired_nonces(&self) -> Result<usize, AppError> {
        self.nonces.purge_expired().await
    }
}

/// The authenticated caller of a protected endpoint.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub wallet: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthService::from_ref(state);
        let header = parts.headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());

        let token = extract_bearer_token(header)
            .ok_or_else(|| AppError::unauthorized("Unauthorized - Invalid or missing token"))?;
        let claims = auth.validate_token(&token)?;

        Ok(Self {
            user_id: claims.sub,
            wallet: claims.wallet,
        })
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: Option<&str>) -> Option<String> {
    auth_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn is_signature_shaped(signature: &str) -> bool {
    signature
        .strip_prefix("0x")
        .map(|hex| hex.len() == 130 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
