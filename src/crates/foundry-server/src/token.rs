//! Execution-token claims for remote containers
//!
//! A container proves its right to post webhooks for one execution with a
//! short-lived HS256 token: `iss=foundry`, `aud=foundry-container`,
//! `type=execution`, lifetime capped at one hour. Verification checks
//! signature, issuer, audience and expiry; the caller additionally matches
//! the `executionId` claim against the webhook URL.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const TOKEN_ISSUER: &str = "foundry";
pub const TOKEN_AUDIENCE: &str = "foundry-container";
pub const TOKEN_TYPE: &str = "execution";
const MAX_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(String),

    #[error("token claim mismatch: {0}")]
    ClaimMismatch(String),
}

/// Signed claim set scoped to one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTokenClaims {
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "executionId")]
    pub execution_id: String,
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Process-wide signer/verifier for execution tokens.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs(MAX_TTL_SECS),
        }
    }

    /// Shorter lifetime, clamped to the one-hour maximum.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.min(Duration::from_secs(MAX_TTL_SECS));
        self
    }

    /// Sign a claim scoped to an execution.
    pub fn sign(&self, execution_id: &str, workflow_id: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp() as u64;
        let claims = ExecutionTokenClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs(),
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            token_type: TOKEN_TYPE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    /// Verify signature, issuer, audience, expiry and claim type.
    pub fn verify(&self, token: &str) -> Result<ExecutionTokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        let data = decode::<ExecutionTokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.claims.token_type != TOKEN_TYPE {
            return Err(TokenError::ClaimMismatch(format!(
                "unexpected token type '{}'",
                data.claims.token_type
            )));
        }
        Ok(data.claims)
    }

    /// Verify and bind the token to a specific execution id.
    pub fn verify_for_execution(
        &self,
        token: &str,
        execution_id: &str,
    ) -> Result<ExecutionTokenClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.execution_id != execution_id {
            return Err(TokenError::ClaimMismatch(format!(
                "token is scoped to execution '{}'",
                claims.execution_id
            )));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("a-very-long-signing-secret-for-tests")
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = signer();
        let token = signer.sign("exec-1", "wf-1").unwrap();
        let claims = signer.verify_for_execution(&token, "exec-1").unwrap();
        assert_eq!(claims.iss, "foundry");
        assert_eq!(claims.aud, "foundry-container");
        assert_eq!(claims.workflow_id, "wf-1");
        assert_eq!(claims.token_type, "execution");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_scoping_rejects_other_execution() {
        let signer = signer();
        let token = signer.sign("exec-a", "wf-1").unwrap();
        let err = signer.verify_for_execution(&token, "exec-b").unwrap_err();
        assert!(matches!(err, TokenError::ClaimMismatch(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = signer().sign("exec-1", "wf-1").unwrap();
        let other = TokenSigner::new("a-different-secret-entirely-here");
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new("a-very-long-signing-secret-for-tests");
        let now = Utc::now().timestamp() as u64;
        let claims = ExecutionTokenClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now - 7200,
            exp: now - 3600,
            execution_id: "exec-1".to_string(),
            workflow_id: "wf-1".to_string(),
            token_type: TOKEN_TYPE.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"a-very-long-signing-secret-for-tests"),
        )
        .unwrap();
        assert!(matches!(signer.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_ttl_is_capped_at_one_hour() {
        let signer = signer().with_ttl(Duration::from_secs(86_400));
        let token = signer.sign("exec-1", "wf-1").unwrap();
        let claims = signer.verify(&token).unwrap();
        assert!(claims.exp - claims.iat <= 3600);
    }
}
