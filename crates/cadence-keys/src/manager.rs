use std::sync::Arc;

use cadence_core::config::KeysConfig;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{KeyError, Result};
use crate::store::KeyStore;
use crate::token::TokenSigner;
use crate::types::{ExtensionKey, TokenClaims};

/// Issues, rotates and verifies the capability tokens used by the
/// browser extension.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    signer: TokenSigner,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>, signer: TokenSigner) -> Self {
        Self { store, signer }
    }

    pub fn from_config(store: Arc<dyn KeyStore>, config: &KeysConfig) -> Self {
        Self::new(
            store,
            TokenSigner::new(&config.signing_secret, config.token_ttl_days),
        )
    }

    /// Issue a fresh token and make it the owner's only active key.
    pub fn rotate(&self, owner_id: &str, author_id: &str) -> Result<ExtensionKey> {
        let token = self.signer.sign(owner_id, author_id, Utc::now())?;
        let key = self.store.rotate(owner_id, author_id, &token).inspect_err(|e| {
            warn!(op = "rotate_key", owner_id, error = %e, "key rotation failed");
        })?;
        info!(owner_id, author_id, key_id = %key.id, "extension key issued");
        Ok(key)
    }

    /// The owner's active raw token, if one was ever issued.
    pub fn fetch_active(&self, owner_id: &str) -> Result<Option<String>> {
        Ok(self.store.active(owner_id)?.map(|k| k.token))
    }

    /// Accept `token` for `claimed_owner`/`claimed_author`.
    ///
    /// Passes only if the signature and expiry check out, the claims match
    /// the presented ids, and the token is the owner's current active key.
    /// A rotated-out token therefore fails with `Inactive` even though its
    /// signature is still valid.
    pub fn verify(
        &self,
        token: &str,
        claimed_owner: &str,
        claimed_author: &str,
    ) -> Result<TokenClaims> {
        let result = self.verify_inner(token, claimed_owner, claimed_author);
        if let Err(e) = &result {
            debug!(op = "verify_key", owner_id = claimed_owner, code = e.code(), "capability token rejected");
        }
        result
    }

    fn verify_inner(
        &self,
        token: &str,
        claimed_owner: &str,
        claimed_author: &str,
    ) -> Result<TokenClaims> {
        let claims = self.signer.verify(token, Utc::now())?;
        if claims.owner_id != claimed_owner || claims.author_id != claimed_author {
            return Err(KeyError::Mismatch);
        }
        match self.store.active(claimed_owner)? {
            Some(active) if active.token == token => Ok(claims),
            _ => Err(KeyError::Inactive {
                owner_id: claimed_owner.to_string(),
            }),
        }
    }
}
