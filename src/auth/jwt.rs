use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.jwt_expiry_minutes,
        ))
    }

    pub fn new(secret: &str, issuer: &str, audience: &str, expiry_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            expiry: Duration::minutes(expiry_minutes),
        }
    }

    /// The role claim is informational; authorization re-reads the worker row.
    pub fn generate_token(&self, user_id: Uuid, email: &str, role: Option<&str>) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            role: role.map(str::to_owned),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip_keeps_subject() {
        let jwt = JwtService::new("secret", "panel", "panel-clients", 5);
        let user_id = Uuid::new_v4();
        let token = jwt
            .generate_token(user_id, "ana@example.com", Some("central"))
            .unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.role.as_deref(), Some("central"));
    }

    #[test]
    fn rejects_token_for_other_audience() {
        let issuer = JwtService::new("secret", "panel", "elsewhere", 5);
        let verifier = JwtService::new("secret", "panel", "panel-clients", 5);
        let token = issuer.generate_token(Uuid::new_v4(), "x@y.z", None).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let issuer = JwtService::new("one", "panel", "panel-clients", 5);
        let verifier = JwtService::new("two", "panel", "panel-clients", 5);
        let token = issuer.generate_token(Uuid::new_v4(), "x@y.z", None).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }
}
