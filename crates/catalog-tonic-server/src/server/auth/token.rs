use crate::server::store::User;
use catalog_tonic_core::{Error, Result};
use core::time::Duration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};

/// Payload of an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    pub role: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Issues and verifies HS256-signed access tokens.
///
/// Verification is stateless: a token stays valid until it expires.
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    duration: Duration,
}

impl JwtManager {
    const ALGORITHM: Algorithm = Algorithm::HS256;

    pub fn new(secret: &str, duration: Duration) -> Self {
        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            duration,
        }
    }

    /// Lifetime of issued tokens.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Issues a token for `user` that expires after the configured duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if signing fails.
    pub fn generate(&self, user: &User) -> Result<String> {
        let now = get_current_timestamp();
        let claims = Claims {
            sub: user.username.clone(),
            role: user.role.clone(),
            iat: now,
            exp: now.saturating_add(self.duration.as_secs()),
        };
        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Self::ALGORITHM), claims, &self.encoding)
            .map_err(|e| Error::internal(format!("cannot sign access token: {e}")))
    }

    /// Checks the signature, algorithm and expiry of `token` and returns its
    /// claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] on any failed check.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::InvalidToken {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_tonic_core::types::roles;

    fn user() -> User {
        User {
            username: "admin1".into(),
            hashed_password: String::new(),
            role: roles::ADMIN.into(),
        }
    }

    #[test]
    fn generated_token_verifies() {
        let jwt = JwtManager::new("secret", Duration::from_secs(60));
        let token = jwt.generate(&user()).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin1");
        assert_eq!(claims.role, roles::ADMIN);
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn rejects_foreign_signature() {
        let ours = JwtManager::new("secret", Duration::from_secs(60));
        let theirs = JwtManager::new("other-secret", Duration::from_secs(60));

        let token = theirs.generate(&user()).unwrap();
        assert!(matches!(ours.verify(&token), Err(Error::InvalidToken { .. })));
    }

    #[test]
    fn rejects_expired_token() {
        let jwt = JwtManager::new("secret", Duration::from_secs(60));
        let now = get_current_timestamp();
        let token = jwt
            .sign(&Claims {
                sub: "admin1".into(),
                role: roles::ADMIN.into(),
                iat: now - 120,
                exp: now - 60,
            })
            .unwrap();

        assert!(matches!(jwt.verify(&token), Err(Error::InvalidToken { .. })));
    }

    #[test]
    fn rejects_other_algorithms() {
        let jwt = JwtManager::new("secret", Duration::from_secs(60));
        let now = get_current_timestamp();
        let claims = Claims {
            sub: "admin1".into(),
            role: roles::ADMIN.into(),
            iat: now,
            exp: now + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(matches!(jwt.verify(&token), Err(Error::InvalidToken { .. })));
    }

    #[test]
    fn rejects_garbage() {
        let jwt = JwtManager::new("secret", Duration::from_secs(60));
        assert!(jwt.verify("not.a.token").is_err());
        assert!(jwt.verify("").is_err());
    }
}
