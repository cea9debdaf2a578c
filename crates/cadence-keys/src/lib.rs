//! `cadence-keys`: capability tokens that let the browser extension act
//! for an owner.
//!
//! A token is an HS256-signed claim set `{ownerId, authorId, iat, exp, jti}`
//! with a very long expiry. Long life is safe because every use is checked
//! against the owner's single active row: rotating the key revokes all
//! earlier tokens immediately.

pub mod db;
pub mod error;
pub mod manager;
pub mod store;
pub mod token;
pub mod types;

pub use error::{KeyError, Result};
pub use manager::KeyManager;
pub use store::{KeyStore, MemoryKeyStore, SqliteKeyStore};
pub use token::TokenSigner;
pub use types::{ExtensionKey, TokenClaims};
