//! HTTP Basic auth in front of the audit routes.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use tracing::debug;

use crate::error::Error;

/// The single operator account allowed to read audit data.
#[derive(Debug, Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;
  let encoded = header_val.strip_prefix("Basic ").ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;
  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  if username != config.username {
    return Err(Error::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash).map_err(|_| Error::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)
}

/// `route_layer` middleware: 401 with a `WWW-Authenticate` challenge unless
/// the request carries the audit credentials.
pub async fn require_basic_auth(State(auth): State<Arc<AuthConfig>>, request: Request, next: Next) -> Response {
  match verify_auth(request.headers(), &auth) {
    Ok(()) => next.run(request).await,
    Err(e) => {
      debug!(uri = %request.uri(), "rejected audit request");
      e.into_response()
    }
  }
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::HeaderValue;
  use rand_core::OsRng;

  use super::*;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string();
    AuthConfig { username: "auditor".to_string(), password_hash: hash }
  }

  fn basic(user: &str, pass: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = format!("Basic {}", B64.encode(format!("{user}:{pass}")));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
    headers
  }

  #[test]
  fn correct_credentials() {
    assert!(verify_auth(&basic("auditor", "secret"), &config("secret")).is_ok());
  }

  #[test]
  fn wrong_password() {
    assert!(matches!(verify_auth(&basic("auditor", "wrong"), &config("secret")), Err(Error::Unauthorized)));
  }

  #[test]
  fn wrong_username() {
    assert!(matches!(verify_auth(&basic("someone", "secret"), &config("secret")), Err(Error::Unauthorized)));
  }

  #[test]
  fn missing_header() {
    assert!(matches!(verify_auth(&HeaderMap::new(), &config("secret")), Err(Error::Unauthorized)));
  }

  #[test]
  fn invalid_base64() {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!not-base64!!!"));
    assert!(matches!(verify_auth(&headers, &config("secret")), Err(Error::Unauthorized)));
  }
}
