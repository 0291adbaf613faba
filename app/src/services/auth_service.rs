// app/src/services/auth_service.rs

//! Bearer tokens of the form `v1.<userId>.<expiresUnix>.<hex HMAC-SHA256>`.
//!
//! Login lives outside this system; whatever issues tokens shares the secret
//! and calls [`TokenSigner::issue`].

use crate::errors::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

#[derive(Clone)]
pub struct TokenSigner {
  secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TokenSigner").finish_non_exhaustive()
  }
}

impl TokenSigner {
  pub fn new(secret: &str) -> Self {
    Self {
      secret: secret.as_bytes().to_vec(),
    }
  }

  fn mac(&self) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(&self.secret).map_err(|e| AppError::Config(format!("auth token secret: {}", e)))
  }

  pub fn issue(&self, user_id: Uuid, ttl: Duration, now: DateTime<Utc>) -> Result<String> {
    let expires = (now + ttl).timestamp();
    let claims = format!("{}.{}.{}", TOKEN_VERSION, user_id, expires);
    let mut mac = self.mac()?;
    mac.update(claims.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    debug!(%user_id, expires, "Issued bearer token.");
    Ok(format!("{}.{}", claims, signature))
  }

  /// Returns the user the token was issued to.
  #[instrument(name = "auth_service::verify", skip_all, err(Display))]
  pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid> {
    let parts: Vec<&str> = token.split('.').collect();
    let [version, user, expires, signature] = parts.as_slice() else {
      return Err(AppError::Auth("Malformed bearer token.".to_string()));
    };
    if *version != TOKEN_VERSION {
      return Err(AppError::Auth("Unsupported token version.".to_string()));
    }
    let provided = hex::decode(signature).map_err(|_| AppError::Auth("Malformed token signature.".to_string()))?;
    let mut mac = self.mac()?;
    mac.update(format!("{}.{}.{}", version, user, expires).as_bytes());
    if mac.verify_slice(&provided).is_err() {
      warn!("Bearer token signature mismatch.");
      return Err(AppError::Auth("Invalid bearer token.".to_string()));
    }
    let expires: i64 = expires
      .parse()
      .map_err(|_| AppError::Auth("Malformed token expiry.".to_string()))?;
    if expires < now.timestamp() {
      return Err(AppError::Auth("Bearer token expired.".to_string()));
    }
    Uuid::parse_str(user).map_err(|_| AppError::Auth("Malformed token subject.".to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn issued_tokens_verify_until_expiry() {
    let signer = TokenSigner::new("secret");
    let user = Uuid::new_v4();
    let now = Utc::now();
    let token = signer.issue(user, Duration::minutes(5), now).unwrap();
    assert_eq!(signer.verify(&token, now).unwrap(), user);
    assert!(matches!(
      signer.verify(&token, now + Duration::minutes(6)),
      Err(AppError::Auth(_))
    ));
  }

  #[test]
  fn tampered_or_foreign_tokens_are_rejected() {
    let now = Utc::now();
    let token = TokenSigner::new("secret")
      .issue(Uuid::new_v4(), Duration::minutes(5), now)
      .unwrap();
    assert!(TokenSigner::new("other").verify(&token, now).is_err());

    let other_user = Uuid::new_v4();
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    parts[1] = other_user.to_string();
    assert!(TokenSigner::new("secret").verify(&parts.join("."), now).is_err());
    assert!(TokenSigner::new("secret").verify("garbage", now).is_err());
  }
}
