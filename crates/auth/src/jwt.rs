//! HS256 token signing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use garments_core::{TenantId, UserId};

use crate::{JwtClaims, Role, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Shared-secret validator.
///
/// The claims carry `issued_at`/`expires_at` timestamps instead of the
/// registered `exp`, so the time window is checked with [`validate_claims`].
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Mints tokens for successful logins.
pub struct JwtIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        sub: UserId,
        tenant_id: TenantId,
        roles: Vec<Role>,
        now: DateTime<Utc>,
    ) -> Result<(String, JwtClaims), JwtError> {
        let claims = JwtClaims {
            sub,
            tenant_id,
            roles,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)?;
        Ok((token, claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate_with_the_same_secret_only() {
        let issuer = JwtIssuer::new(b"s3cret", Duration::minutes(30));
        let now = Utc::now();
        let tenant = TenantId::new();
        let (token, claims) = issuer
            .issue(UserId::new(), tenant, vec![Role::new("admin")], now)
            .unwrap();

        let good = Hs256JwtValidator::new(b"s3cret".to_vec());
        let decoded = good.validate(&token, now + Duration::minutes(1)).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.tenant_id, tenant);

        let wrong = Hs256JwtValidator::new(b"other".to_vec());
        assert!(matches!(wrong.validate(&token, now), Err(JwtError::Invalid(_))));

        assert!(matches!(
            good.validate(&token, now + Duration::minutes(31)),
            Err(JwtError::Claims(TokenValidationError::Expired))
        ));
        assert!(good.validate("not.a.token", now).is_err());
    }
}
