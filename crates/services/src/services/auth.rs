use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use db::{
    DbErr,
    models::{
        refresh_token::RefreshToken,
        user::{CreateUser, UpdateUser, User},
    },
    types::UserStatus,
};
use rand::{Rng, RngCore, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utils_jwt::{JwtError, JwtKeys};
use uuid::Uuid;

const REFRESH_TOKEN_LEN: usize = 48;
const MIN_PASSWORD_LEN: usize = 8;
const MIN_NAME_LEN: usize = 2;
const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("User with this email already exists")]
    AlreadyExists,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("{0}")]
    Validation(String),
    #[error("User not found")]
    NotFound,
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Tokens handed out on register, login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Directory listing parameters. Pages start at 1; out-of-range values fall
/// back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListParams {
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl UserListParams {
    fn page(&self) -> u64 {
        self.page.filter(|page| *page > 0).unwrap_or(1)
    }

    fn page_size(&self) -> u64 {
        self.page_size
            .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub items: Vec<User>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[derive(Clone)]
pub struct AuthService {
    keys: JwtKeys,
    refresh_ttl: Duration,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    thread_rng().fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|err| AuthError::Hash(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn hash_refresh_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::Validation("A valid email is required".to_string())),
    }
}

impl AuthService {
    pub fn new(keys: JwtKeys, refresh_ttl: Duration) -> Self {
        Self { keys, refresh_ttl }
    }

    async fn issue_session(&self, pool: &db::DbPool, user: User) -> Result<AuthSession> {
        let access_token = self.keys.issue(user.id)?;
        let refresh_token = generate_refresh_token();
        RefreshToken::create(
            pool,
            user.id,
            &hash_refresh_token(&refresh_token),
            Utc::now() + self.refresh_ttl,
        )
        .await?;
        Ok(AuthSession {
            user,
            access_token,
            refresh_token,
            expires_in: self.keys.ttl().num_seconds(),
        })
    }

    pub async fn register(
        &self,
        pool: &db::DbPool,
        payload: &RegisterRequest,
    ) -> Result<AuthSession> {
        let name = payload.name.trim();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(AuthError::Validation(
                "Name must be at least 2 characters".to_string(),
            ));
        }
        if payload.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        let email = normalize_email(&payload.email)?;
        if User::find_by_email(pool, &email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let user = User::create(
            pool,
            &CreateUser {
                email,
                name: name.to_string(),
                password_hash: hash_password(&payload.password)?,
                status: UserStatus::Online,
            },
        )
        .await?;
        tracing::info!(user_id = %user.id, "user registered");
        self.issue_session(pool, user).await
    }

    pub async fn login(&self, pool: &db::DbPool, payload: &LoginRequest) -> Result<AuthSession> {
        let email = payload.email.trim().to_lowercase();
        let Some((user, hash)) = User::find_credentials_by_email(pool, &email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&payload.password, &hash) {
            return Err(AuthError::InvalidCredentials);
        }

        User::mark_seen(pool, user.id, UserStatus::Online).await?;
        let user = User::find_by_id(pool, user.id)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.issue_session(pool, user).await
    }

    /// Exchanges a refresh token for a new pair. The old token stops working.
    pub async fn refresh(&self, pool: &db::DbPool, refresh_token: &str) -> Result<AuthSession> {
        let stored = RefreshToken::take(pool, &hash_refresh_token(refresh_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::InvalidToken);
        }
        let user = User::find_by_id(pool, stored.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        self.issue_session(pool, user).await
    }

    pub async fn logout(&self, pool: &db::DbPool, refresh_token: &str) -> Result<()> {
        RefreshToken::delete_by_hash(pool, &hash_refresh_token(refresh_token)).await?;
        Ok(())
    }

    pub async fn me(&self, pool: &db::DbPool, user_id: Uuid) -> Result<User> {
        User::find_by_id(pool, user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    pub async fn get_user(&self, pool: &db::DbPool, user_id: Uuid) -> Result<User> {
        self.me(pool, user_id).await
    }

    pub async fn list_users(
        &self,
        pool: &db::DbPool,
        params: &UserListParams,
    ) -> Result<UserPage> {
        let (page, page_size) = (params.page(), params.page_size());
        let (items, total) = User::search(
            pool,
            params.search.as_deref(),
            page_size,
            (page - 1) * page_size,
        )
        .await?;
        Ok(UserPage {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    pub async fn update_me(
        &self,
        pool: &db::DbPool,
        user_id: Uuid,
        payload: &UpdateUser,
    ) -> Result<User> {
        if payload
            .name
            .as_deref()
            .is_some_and(|name| name.trim().chars().count() < MIN_NAME_LEN)
        {
            return Err(AuthError::Validation(
                "Name must be at least 2 characters".to_string(),
            ));
        }
        match User::update(pool, user_id, payload).await {
            Ok(user) => Ok(user),
            Err(DbErr::RecordNotFound(_)) => Err(AuthError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the user id carried by a valid access token.
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid> {
        match self.keys.verify(token) {
            Ok(claims) => Ok(claims.sub),
            Err(_) => Err(AuthError::InvalidToken),
        }
    }

    /// Refreshes `last_seen_at` at most once per minute.
    pub async fn touch(&self, pool: &db::DbPool, user_id: Uuid) -> Result<()> {
        User::touch_last_seen(pool, user_id, Utc::now() - Duration::minutes(1)).await?;
        Ok(())
    }
}
