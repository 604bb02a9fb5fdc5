// server/src/services/auth_service.rs

//! Staff identity for the poll, collect and status endpoints. Tokens are
//! bearer credentials configured up front; comparison is constant-time.

use crate::errors::AppError;
use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use async_trait::async_trait;
use payconfirm::model::{StaffPrincipal, StaffRole};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[async_trait(?Send)]
pub trait Authorizer: Send + Sync {
  /// Resolves the caller, or fails with `Auth` (401) / `Forbidden` (403).
  async fn authorize(&self, request: &HttpRequest, require_manager: bool) -> Result<StaffPrincipal, AppError>;
}

struct StaffToken {
  token: Vec<u8>,
  principal: StaffPrincipal,
}

pub struct StaticTokenAuthorizer {
  tokens: Vec<StaffToken>,
}

/// Stable staff id derived from the email, so audit rows survive restarts.
fn staff_id(email: &str) -> Uuid {
  let digest = Sha256::digest(email.trim().to_ascii_lowercase().as_bytes());
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&digest[..16]);
  uuid::Builder::from_random_bytes(bytes).into_uuid()
}

impl StaticTokenAuthorizer {
  /// Parses `token:role:email` entries separated by `;`.
  pub fn from_spec(spec: &str) -> Result<Self, AppError> {
    let mut tokens = Vec::new();
    for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
      let mut parts = entry.splitn(3, ':');
      let (Some(token), Some(role), Some(email)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AppError::Config("STAFF_TOKENS entries must look like token:role:email".to_string()));
      };
      if token.len() < 8 {
        return Err(AppError::Config(format!("staff token for {} is too short", email)));
      }
      let role: StaffRole = role.parse().map_err(AppError::Config)?;
      tokens.push(StaffToken {
        token: token.as_bytes().to_vec(),
        principal: StaffPrincipal {
          id: staff_id(email),
          email: email.trim().to_string(),
          role,
        },
      });
    }
    if tokens.is_empty() {
      warn!("No staff tokens configured; staff endpoints will reject every request.");
    }
    Ok(Self { tokens })
  }

  // Checks every entry so timing does not reveal which one matched.
  fn lookup(&self, presented: &[u8]) -> Option<&StaffPrincipal> {
    let mut found = None;
    for entry in &self.tokens {
      if bool::from(entry.token.ct_eq(presented)) {
        found = Some(&entry.principal);
      }
    }
    found
  }
}

#[async_trait(?Send)]
impl Authorizer for StaticTokenAuthorizer {
  #[instrument(name = "auth_service::authorize", skip(self, request))]
  async fn authorize(&self, request: &HttpRequest, require_manager: bool) -> Result<StaffPrincipal, AppError> {
    let header = request
      .headers()
      .get(AUTHORIZATION)
      .and_then(|h| h.to_str().ok())
      .ok_or_else(|| AppError::Auth("Missing bearer token".to_string()))?;
    let token = header
      .strip_prefix("Bearer ")
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .ok_or_else(|| AppError::Auth("Malformed authorization header".to_string()))?;

    let principal = self
      .lookup(token.as_bytes())
      .cloned()
      .ok_or_else(|| AppError::Auth("Invalid staff token".to_string()))?;
    if require_manager && !principal.role.is_manager() {
      return Err(AppError::Forbidden("Manager role required".to_string()));
    }
    debug!(staff = %principal.email, role = %principal.role, "Staff request authorized.");
    Ok(principal)
  }
}
