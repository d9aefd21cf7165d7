//! Bearer secrets

use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::rand::{self, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hex;

/// Secret Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secret is empty
    #[error("Secret is empty")]
    EmptySecret,
}

/// The secret data that allows spending ecash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create new [`Secret`]
    pub fn new<S>(secret: S) -> Self
    where
        S: Into<String>,
    {
        Self(secret.into())
    }

    /// Generate a random secret (hex of 32 random bytes)
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let mut random_bytes = [0u8; 32];
        rng.fill_bytes(&mut random_bytes);

        Self(hex::encode(random_bytes))
    }

    /// [`Secret`] as bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// [`Secret`] to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone().into_bytes()
    }

    /// Whether the secret has the shape of a NUT-10 well-known secret
    pub fn is_nut10(&self) -> bool {
        self.0.trim_start().starts_with("[\"")
    }
}

impl FromStr for Secret {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptySecret);
        }

        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn generate_is_64_hex_chars() {
        let secret = Secret::generate();
        assert_eq!(secret.to_string().len(), 64);
        assert!(hex::decode(secret.to_string()).is_ok());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(Secret::from_str("").is_err());
    }

    #[test]
    fn nut10_shape_is_detected() {
        let secret = Secret::from_str(
            r#"["P2PK",{"nonce":"859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f","data":"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7"}]"#,
        )
        .unwrap();
        assert!(secret.is_nut10());
        assert!(!Secret::generate().is_nut10());
    }
}
