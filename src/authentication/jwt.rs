use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::constants::SESSION_LIFETIME_HOURS;
use crate::database::schema::{Id, User, UserRole};
use crate::error::{Error, HtmlError};

use super::permissions::ActionType;

/// HMAC key shared with whoever issues session tokens.
#[derive(Clone)]
pub struct SessionKey(Hmac<Sha256>);

impl SessionKey {
    pub fn new(secret: &[u8]) -> Result<Self, Error> {
        Hmac::new_from_slice(secret)
            .map(Self)
            .map_err(|_| HtmlError::InternalServerError.new("Invalid session secret"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_superuser: bool,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, is_superuser: bool) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(SESSION_LIFETIME_HOURS)).timestamp();

        Self {
            user_id: id,
            username,
            role,
            is_superuser,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        (self.exp - Local::now().timestamp()).is_negative()
    }
}

/// The authenticated principal of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_superuser: bool,
}

impl SessionData {
    pub fn is_admin(&self) -> bool {
        self.is_superuser || self.role == UserRole::Admin
    }

    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(HtmlError::Forbidden.default());
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
            is_superuser: value.is_superuser,
        }
    }
}

pub fn generate_jwt_session(user: &User, key: &SessionKey) -> Result<String, Error> {
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role.to_owned(),
        user.is_superuser,
    );

    sign_jwt_session(&claims, key)
}

pub fn sign_jwt_session(claims: &JwtSessionData, key: &SessionKey) -> Result<String, Error> {
    claims
        .sign_with_key(&key.0)
        .map_err(|_| HtmlError::InternalServerError.new("Could not sign session"))
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, Error> {
    let session: JwtSessionData = token
        .verify_with_key(&key.0)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid session; Invalid token"))?;

    if session.is_expired() {
        return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
    }

    Ok(session)
}
