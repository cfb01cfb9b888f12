use anyhow::{ensure, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEMBER: &str = "member";

const CLOCK_SKEW_SECONDS: u64 = 30;

/// HS256 bearer tokens shared with the account service that issues them.
/// Member tokens from that service carry no role claim.
#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        ensure!(!config.jwt_secret.is_empty(), "JWT_SECRET must not be empty");
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            lifetime: Duration::minutes(config.jwt_expiry_minutes.max(1)),
        })
    }

    /// Issues a token for `user_id` signed with the shared secret.
    pub fn generate_token(&self, user_id: Uuid, email: Option<&str>, role: &str) -> Result<String> {
        let issued_at = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.map(str::to_owned),
            role: role.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.lifetime).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = CLOCK_SKEW_SECONDS;
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "member_role")]
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

fn member_role() -> String {
    ROLE_MEMBER.to_string()
}
