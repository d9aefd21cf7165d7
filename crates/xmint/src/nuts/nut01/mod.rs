//! NUT-01: Mint public key exchange
//!
//! <https://github.com/cashubtc/nuts/blob/main/01.md>

use std::collections::BTreeMap;
#[cfg(feature = "mint")]
use std::ops::{Deref, DerefMut};

use bitcoin::secp256k1;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

mod public_key;
mod secret_key;

pub use self::public_key::PublicKey;
pub use self::secret_key::SecretKey;
use super::nut02::KeySet;
use crate::amount::Amount;

/// Nut01 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
    /// Json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Invalid public key size
    #[error("Invalid public key size: expected={expected}, found={found}")]
    InvalidPublicKeySize {
        /// Expected size
        expected: usize,
        /// Actual size
        found: usize,
    },
    /// Schnorr error
    #[error(transparent)]
    Schnorr(#[from] crate::schnorr::Error),
}

/// Mint Keys [NUT-01]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Keys(BTreeMap<Amount, PublicKey>);

impl Keys {
    /// Create new [`Keys`]
    #[inline]
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(keys)
    }

    /// Get [`Keys`]
    #[inline]
    pub fn keys(&self) -> &BTreeMap<Amount, PublicKey> {
        &self.0
    }

    /// Get [`PublicKey`] for [`Amount`]
    #[inline]
    pub fn amount_key(&self, amount: Amount) -> Option<PublicKey> {
        self.0.get(&amount).copied()
    }

    /// Iterate through the (`Amount`, `PublicKey`) entries in the map
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&Amount, &PublicKey)> {
        self.0.iter()
    }
}

#[cfg(feature = "mint")]
impl From<MintKeys> for Keys {
    fn from(keys: MintKeys) -> Self {
        Self(
            keys.0
                .iter()
                .map(|(amount, keypair)| (*amount, keypair.public_key))
                .collect(),
        )
    }
}

/// Mint Public Keys [NUT-01]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeysResponse {
    /// Keysets the mint will sign with
    pub keysets: Vec<KeySet>,
}

impl<'de> Deserialize<'de> for KeysResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let keys_response: Value = Value::deserialize(deserializer)?;

        let keysets = keys_response
            .get("keysets")
            .ok_or(de::Error::custom("Keysets not found"))?
            .as_array()
            .ok_or(de::Error::custom("Keysets not found"))?;

        // Tolerate individual keysets that fail to parse
        let keysets = keysets
            .iter()
            .flat_map(|keyset| serde_json::from_value(keyset.clone()))
            .collect();

        Ok(KeysResponse { keysets })
    }
}

/// Mint keypair for a single denomination
#[cfg(feature = "mint")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeyPair {
    /// Mint private key for the denomination
    pub secret_key: SecretKey,
    /// Mint public key for the denomination
    pub public_key: PublicKey,
}

#[cfg(feature = "mint")]
impl MintKeyPair {
    /// Generate a random keypair
    pub fn generate() -> Self {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }
}

/// Mint keys (denomination -> keypair)
#[cfg(feature = "mint")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeys(BTreeMap<Amount, MintKeyPair>);

#[cfg(feature = "mint")]
impl Deref for MintKeys {
    type Target = BTreeMap<Amount, MintKeyPair>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(feature = "mint")]
impl DerefMut for MintKeys {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(feature = "mint")]
impl MintKeys {
    /// Create new [`MintKeys`]
    #[inline]
    pub fn new(map: BTreeMap<Amount, MintKeyPair>) -> Self {
        Self(map)
    }
}
