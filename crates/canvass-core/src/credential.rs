//! Access credentials and the token issuer.
//!
//! Each `(form, recipient)` pair owns at most one credential. Its token is a
//! keyed HMAC-SHA256 over the pair, the recipient's enrolment number, a
//! nanosecond timestamp and a random nonce, encoded as unpadded URL-safe
//! base64. The secret never leaves the issuer.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
  Error, Result,
  recipient::{Recipient, RecipientKind},
  store::FeedbackStore,
};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

// ─── Credential ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCredential {
  pub credential_id:  Uuid,
  pub form_id:        Uuid,
  pub recipient_kind: RecipientKind,
  pub recipient_id:   Uuid,
  pub token:          String,
  pub is_submitted:   bool,
  pub is_deleted:     bool,
  pub created_at:     DateTime<Utc>,
}

/// Input to [`FeedbackStore::upsert_credential`]. `token` is only used when
/// no credential exists yet for the pair.
#[derive(Debug, Clone)]
pub struct NewCredential {
  pub form_id:        Uuid,
  pub recipient_kind: RecipientKind,
  pub recipient_id:   Uuid,
  pub token:          String,
}

// ─── Issuer ──────────────────────────────────────────────────────────────────

/// Derives unguessable tokens from a server-held secret.
#[derive(Clone)]
pub struct CredentialIssuer {
  mac: HmacSha256,
}

impl fmt::Debug for CredentialIssuer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CredentialIssuer").finish_non_exhaustive()
  }
}

impl CredentialIssuer {
  pub fn new(secret: &[u8]) -> Result<Self> {
    if secret.is_empty() {
      return Err(Error::InvalidSecret("token secret must not be empty".into()));
    }
    let mac = HmacSha256::new_from_slice(secret)
      .map_err(|e| Error::InvalidSecret(e.to_string()))?;
    Ok(Self { mac })
  }

  /// Derive a fresh token for `recipient` on `form_id`. Two calls never
  /// return the same token.
  pub fn mint(&self, form_id: Uuid, recipient: &Recipient) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let now = Utc::now();
    let nanos = now
      .timestamp_nanos_opt()
      .unwrap_or_else(|| now.timestamp_micros());

    let mut mac = self.mac.clone();
    mac.update(form_id.as_bytes());
    mac.update(b"|");
    mac.update(recipient.recipient_id.as_bytes());
    mac.update(b"|");
    mac.update(recipient.enrollment_no.as_bytes());
    mac.update(b"|");
    mac.update(&nanos.to_be_bytes());
    mac.update(b"|");
    mac.update(&nonce);

    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
  }
}

/// Return the credential for `(form_id, recipient)`, creating it if needed.
///
/// Idempotent: repeated calls yield the same token and a single record.
pub async fn issue_or_reuse<S>(
  store: &S,
  issuer: &CredentialIssuer,
  form_id: Uuid,
  recipient: &Recipient,
) -> Result<AccessCredential>
where
  S: FeedbackStore,
{
  let candidate = NewCredential {
    form_id,
    recipient_kind: recipient.kind,
    recipient_id: recipient.recipient_id,
    token: issuer.mint(form_id, recipient),
  };
  store.upsert_credential(candidate).await.map_err(Error::store)
}
