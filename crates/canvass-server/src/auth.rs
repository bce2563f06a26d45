//! HTTP Basic-auth middleware for the administrative routes.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

use crate::error::Error;

/// Credentials accepted as valid for this server instance.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Verify `Authorization: Basic …` against `config`.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  if username != config.username {
    return Err(Error::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash)
    .map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)?;

  Ok(())
}

/// Reject the request with 401 unless it carries valid credentials.
pub async fn require_auth(
  State(config): State<Arc<AuthConfig>>,
  req: Request,
  next: Next,
) -> Response {
  match verify_auth(req.headers(), &config) {
    Ok(()) => next.run(req).await,
    Err(e) => {
      tracing::debug!(path = %req.uri().path(), "rejected unauthenticated request");
      e.into_response()
    }
  }
}

#[cfg(test)]
mod tests {
  use axum::http::header;

  use super::*;

  fn config(password: &str) -> AuthConfig {
    AuthConfig { username: "admin".into(), password_hash: crate::hash_password(password).unwrap() }
  }

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, value.parse().unwrap());
    h
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  #[test]
  fn correct_credentials() {
    let cfg = config("secret");
    assert!(verify_auth(&headers(&basic("admin", "secret")), &cfg).is_ok());
  }

  #[test]
  fn wrong_password() {
    let cfg = config("secret");
    let res = verify_auth(&headers(&basic("admin", "wrong")), &cfg);
    assert!(matches!(res, Err(Error::Unauthorized)));
  }

  #[test]
  fn wrong_username() {
    let cfg = config("secret");
    let res = verify_auth(&headers(&basic("root", "secret")), &cfg);
    assert!(matches!(res, Err(Error::Unauthorized)));
  }

  #[test]
  fn missing_header() {
    let cfg = config("secret");
    assert!(matches!(verify_auth(&HeaderMap::new(), &cfg), Err(Error::Unauthorized)));
  }

  #[test]
  fn invalid_base64() {
    let cfg = config("secret");
    let res = verify_auth(&headers("Basic !!!not-base64!!!"), &cfg);
    assert!(matches!(res, Err(Error::Unauthorized)));
  }

  #[test]
  fn malformed_stored_hash() {
    let cfg = AuthConfig { username: "admin".into(), password_hash: "plaintext".into() };
    let res = verify_auth(&headers(&basic("admin", "plaintext")), &cfg);
    assert!(matches!(res, Err(Error::Unauthorized)));
  }
}
