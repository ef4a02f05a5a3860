//! JWT codec for session token issuance and verification
//!
//! Keys form a ring identified by `kid` so signing keys can be rotated while
//! tokens signed by the previous key still verify. Expiry is checked against
//! the injected clock after the signature, so an expired token that was never
//! validly signed is reported as invalid, not expired.

use chrono::Duration as ChronoDuration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, decode_header,
    encode,
};
use std::sync::Arc;
use std::time::Duration;

use super::revocation::RevocationList;
use crate::config::{AuthConfig, FailurePolicy, SigningKeyConfig};
use crate::domain::auth::{AuthError, Identity, Role, SessionClaims, SubjectId};
use crate::domain::tenant::TenantId;
use crate::infrastructure::clock::Clock;

/// Key used to verify tokens
struct VerificationKey {
    kid: String,
    algorithm: Algorithm,
    decoding: DecodingKey,
}

/// Key used to issue tokens
struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    encoding: EncodingKey,
}

/// Revocation lookup settings
struct RevocationCheck {
    list: Arc<dyn RevocationList>,
    timeout: Duration,
    failure_policy: FailurePolicy,
}

fn key_error(kid: &str, e: impl std::fmt::Display) -> AuthError {
    AuthError::InvalidSigningKey {
        kid: kid.to_string(),
        message: e.to_string(),
    }
}

fn decoding_key(config: &SigningKeyConfig) -> Result<DecodingKey, AuthError> {
    if config.is_symmetric() {
        let secret = config
            .secret
            .as_deref()
            .ok_or_else(|| key_error(&config.kid, "missing secret"))?;
        return Ok(DecodingKey::from_secret(secret.as_bytes()));
    }

    let pem = config
        .public_key_pem
        .as_deref()
        .ok_or_else(|| key_error(&config.kid, "missing public_key_pem"))?
        .as_bytes();

    let key = match config.algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(key_error(&config.kid, "unreachable symmetric algorithm"));
        }
    };
    key.map_err(|e| key_error(&config.kid, e))
}

/// `None` when the key can only verify
fn encoding_key(config: &SigningKeyConfig) -> Result<Option<EncodingKey>, AuthError> {
    if config.is_symmetric() {
        return Ok(config
            .secret
            .as_deref()
            .map(|secret| EncodingKey::from_secret(secret.as_bytes())));
    }

    let Some(pem) = config.private_key_pem.as_deref() else {
        return Ok(None);
    };
    let pem = pem.as_bytes();

    let key = match config.algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => return Ok(None),
    };
    key.map(Some).map_err(|e| key_error(&config.kid, e))
}

/// JWT codec for issuing and verifying session tokens
pub struct TokenCodec {
    keys: Vec<VerificationKey>,
    signing: Option<SigningKey>,
    issuer: Option<String>,
    clock_skew_secs: i64,
    token_ttl: ChronoDuration,
    clock: Arc<dyn Clock>,
    revocation: Option<RevocationCheck>,
}

impl TokenCodec {
    /// Build the key ring from configuration
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let mut keys = Vec::with_capacity(config.signing_keys.len());
        let mut signing = None;

        let primary_kid = config
            .primary_key_id
            .as_deref()
            .or_else(|| config.signing_keys.first().map(|k| k.kid.as_str()));

        for key in &config.signing_keys {
            keys.push(VerificationKey {
                kid: key.kid.clone(),
                algorithm: key.algorithm,
                decoding: decoding_key(key)?,
            });

            if Some(key.kid.as_str()) == primary_kid
                && let Some(encoding) = encoding_key(key)?
            {
                signing = Some(SigningKey {
                    kid: key.kid.clone(),
                    algorithm: key.algorithm,
                    encoding,
                });
            }
        }

        if keys.is_empty() {
            return Err(AuthError::InvalidSigningKey {
                kid: String::new(),
                message: "no signing keys configured".to_string(),
            });
        }

        tracing::debug!(
            keys = keys.len(),
            primary = signing.as_ref().map(|k| k.kid.as_str()),
            "Token codec key ring loaded"
        );

        Ok(Self {
            keys,
            signing,
            issuer: config.issuer.clone(),
            clock_skew_secs: i64::try_from(config.clock_skew_seconds).unwrap_or(i64::MAX),
            token_ttl: i64::try_from(config.token_ttl_minutes)
                .ok()
                .and_then(ChronoDuration::try_minutes)
                .ok_or_else(|| AuthError::IssueFailed {
                    message: format!(
                        "token_ttl_minutes {} is out of range",
                        config.token_ttl_minutes
                    ),
                })?,
            clock,
            revocation: None,
        })
    }

    /// Consult `list` after signature and expiry checks
    pub fn with_revocation(
        mut self,
        list: Arc<dyn RevocationList>,
        timeout: Duration,
        failure_policy: FailurePolicy,
    ) -> Self {
        self.revocation = Some(RevocationCheck {
            list,
            timeout,
            failure_policy,
        });
        self
    }

    pub fn revocation_list(&self) -> Option<&Arc<dyn RevocationList>> {
        self.revocation.as_ref().map(|check| &check.list)
    }

    /// Issue a token for an identity with the primary key
    pub fn issue(
        &self,
        subject: &SubjectId,
        tenant: &TenantId,
        role: Role,
        ttl: Option<ChronoDuration>,
    ) -> Result<String, AuthError> {
        let mut claims = SessionClaims::new(
            subject,
            tenant,
            role,
            self.clock.now(),
            ttl.unwrap_or(self.token_ttl),
        );
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer.clone());
        }
        self.encode(&claims)
    }

    /// Sign arbitrary claims with the primary key
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        let signing = self.signing.as_ref().ok_or_else(|| AuthError::IssueFailed {
            message: "no primary key with signing material".to_string(),
        })?;

        let mut header = Header::new(signing.algorithm);
        header.kid = Some(signing.kid.clone());

        encode(&header, claims, &signing.encoding).map_err(|e| {
            tracing::error!("Failed to encode session token: {}", e);
            AuthError::IssueFailed {
                message: e.to_string(),
            }
        })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        // Expiry is checked against the injected clock
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        match &self.issuer {
            Some(issuer) => {
                validation.set_issuer(&[issuer]);
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
            None => validation.set_required_spec_claims(&["exp"]),
        }
        validation
    }

    fn decode_with(
        &self,
        token: &str,
        key: &VerificationKey,
    ) -> Result<TokenData<SessionClaims>, jsonwebtoken::errors::Error> {
        decode::<SessionClaims>(token, &key.decoding, &self.validation(key.algorithm))
    }

    /// Check the signature against the key ring and return the claims
    fn verify_signature(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!("Malformed token header: {}", e);
            AuthError::InvalidToken
        })?;

        if let Some(kid) = &header.kid {
            let key = self
                .keys
                .iter()
                .find(|k| &k.kid == kid)
                .ok_or_else(|| {
                    tracing::debug!(kid = %kid, "Token signed with unknown key");
                    AuthError::InvalidToken
                })?;

            if key.algorithm != header.alg {
                tracing::debug!(kid = %kid, "Token algorithm does not match key");
                return Err(AuthError::InvalidToken);
            }

            return self
                .decode_with(token, key)
                .map(|data| data.claims)
                .map_err(|e| {
                    tracing::debug!("Token validation failed: {}", e);
                    AuthError::InvalidToken
                });
        }

        // No kid: exactly one active key of the header's algorithm must verify
        let mut verified = None;
        for key in self.keys.iter().filter(|k| k.algorithm == header.alg) {
            match self.decode_with(token, key) {
                Ok(data) if verified.is_none() => verified = Some(data.claims),
                Ok(_) => {
                    tracing::debug!("Token without kid verifies under several keys");
                    return Err(AuthError::InvalidToken);
                }
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => continue,
                Err(e) => {
                    tracing::debug!("Token validation failed: {}", e);
                    return Err(AuthError::InvalidToken);
                }
            }
        }

        verified.ok_or(AuthError::InvalidToken)
    }

    /// Verify signature, lifetime and issuance time; no revocation lookup
    pub fn decode_verified(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let claims = self.verify_signature(token)?;

        if !claims.has_valid_lifetime() {
            return Err(AuthError::InvalidToken);
        }

        let now = self.clock.now_secs();
        if claims.iat > now.saturating_add(self.clock_skew_secs) {
            tracing::debug!(iat = claims.iat, now, "Token issued in the future");
            return Err(AuthError::InvalidToken);
        }
        if now >= claims.exp.saturating_add(self.clock_skew_secs) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Full verification: signature, lifetime, then revocation
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.decode_verified(token)?;
        if let Some(check) = &self.revocation {
            self.check_revocation(check, &claims).await?;
        }
        Ok(claims.into_identity())
    }

    async fn check_revocation(
        &self,
        check: &RevocationCheck,
        claims: &SessionClaims,
    ) -> Result<(), AuthError> {
        let identity = claims.clone().into_identity();
        let lookup = async {
            match check.list.is_revoked(&identity.token_id).await {
                Ok(false) => {
                    check
                        .list
                        .is_subject_revoked(&identity.tenant, &identity.subject, claims.iat)
                        .await
                }
                other => other,
            }
        };

        let failure = match tokio::time::timeout(check.timeout, lookup).await {
            Ok(Ok(false)) => return Ok(()),
            Ok(Ok(true)) => return Err(AuthError::TokenRevoked),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("lookup timed out after {:?}", check.timeout),
        };

        match check.failure_policy {
            FailurePolicy::FailClosed => {
                tracing::warn!(error = %failure, "Revocation lookup failed, rejecting token");
                Err(AuthError::RevocationUnavailable { message: failure })
            }
            FailurePolicy::FailOpen => {
                tracing::warn!(error = %failure, "Revocation lookup failed, accepting token");
                Ok(())
            }
        }
    }

    /// Revoke the token behind `identity` until it would have expired
    pub async fn revoke(&self, identity: &Identity) -> Result<(), AuthError> {
        let Some(check) = &self.revocation else {
            return Err(AuthError::RevocationUnavailable {
                message: "revocation is disabled".to_string(),
            });
        };

        let remaining = (identity.expires_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        match tokio::time::timeout(
            check.timeout,
            check.list.revoke_token(&identity.token_id, remaining),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AuthError::RevocationUnavailable {
                message: e.to_string(),
            }),
            Err(_) => Err(AuthError::RevocationUnavailable {
                message: format!("revocation timed out after {:?}", check.timeout),
            }),
        }
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("kids", &self.keys.iter().map(|k| &k.kid).collect::<Vec<_>>())
            .field("signing_kid", &self.signing.as_ref().map(|k| &k.kid))
            .field("issuer", &self.issuer)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn codec(clock: &ManualClock) -> TokenCodec {
        let config = AuthConfig {
            signing_keys: vec![SigningKeyConfig::hmac("k1", Algorithm::HS256, SECRET)],
            ..AuthConfig::default()
        };
        TokenCodec::from_config(&config, Arc::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_issue_and_decode() {
        let clock = ManualClock::at_secs(1_800_000_000);
        let codec = codec(&clock);

        let token = codec
            .issue(&SubjectId::new("u1"), &TenantId::new("acme"), Role::Member, None)
            .unwrap();
        let claims = codec.decode_verified(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.tid, "acme");
        assert_eq!(claims.iss.as_deref(), Some("hearth"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_header_carries_kid() {
        let clock = ManualClock::at_secs(1_800_000_000);
        let codec = codec(&clock);
        let token = codec
            .issue(&SubjectId::new("u1"), &TenantId::new("acme"), Role::Guest, None)
            .unwrap();
        assert_eq!(decode_header(&token).unwrap().kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let clock = ManualClock::at_secs(1_800_000_000);
        assert_eq!(
            codec(&clock).decode_verified("not.a.token"),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_debug_hides_key_material() {
        let clock = ManualClock::at_secs(0);
        let debug = format!("{:?}", codec(&clock));
        assert!(debug.contains("k1"));
        assert!(!debug.contains(SECRET));
    }
}
