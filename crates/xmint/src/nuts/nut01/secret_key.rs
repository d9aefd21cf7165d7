use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use bitcoin::secp256k1;
use bitcoin::secp256k1::rand::rngs::OsRng;
use bitcoin::secp256k1::{Parity, Scalar};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Error, PublicKey};
use crate::schnorr::{self, Signature};
use crate::SECP256K1;

/// SecretKey
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: secp256k1::SecretKey,
}

impl Deref for SecretKey {
    type Target = secp256k1::SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<secp256k1::SecretKey> for SecretKey {
    fn from(inner: secp256k1::SecretKey) -> Self {
        Self { inner }
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("inner", &"[REDACTED]")
            .finish()
    }
}

impl SecretKey {
    /// Parse from `bytes`
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::SecretKey::from_slice(slice)?,
        })
    }

    /// Parse from `hex` string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        Ok(Self {
            inner: secp256k1::SecretKey::from_str(hex.as_ref())?,
        })
    }

    /// Generate random secret key
    pub fn generate() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut OsRng);
        Self { inner: secret_key }
    }

    /// Get secret key as `hex` string
    pub fn to_secret_hex(&self) -> String {
        self.inner.display_secret().to_string()
    }

    /// Get secret key as `bytes`
    pub fn as_secret_bytes(&self) -> &[u8] {
        self.inner.as_ref()
    }

    /// Get secret key as `bytes`
    pub fn to_secret_bytes(&self) -> [u8; 32] {
        self.inner.secret_bytes()
    }

    /// Raw-challenge schnorr signature on `msg`
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, Error> {
        Ok(schnorr::sign(self, msg)?)
    }

    /// Get public key
    pub fn public_key(&self) -> PublicKey {
        self.inner.public_key(&SECP256K1).into()
    }

    /// Canonical form: negated when the public point has odd y
    ///
    /// Raw-challenge signing and the adaptor algebra require even-y points
    /// for all of `P`, `R` and `T` so that every party evaluates the same
    /// verification equation.
    pub fn canonical(&self) -> SecretKey {
        let (_, parity) = self.inner.x_only_public_key(&SECP256K1);
        match parity {
            Parity::Even => self.clone(),
            _ => self.inner.negate().into(),
        }
    }

    /// Scalar addition mod n: `self + tweak`
    ///
    /// Used for the `x + t` spending key of outputs locked to `P + T`.
    pub fn add_tweak(&self, tweak: &SecretKey) -> Result<SecretKey, Error> {
        Ok(self
            .inner
            .add_tweak(&Scalar::from(tweak.inner))
            .map(Into::<SecretKey>::into)?)
    }

    /// [`SecretKey`] to [`Scalar`]
    #[inline]
    pub fn to_scalar(self) -> Scalar {
        Scalar::from(self.inner)
    }

    /// [`SecretKey`] as [`Scalar`]
    #[inline]
    pub fn as_scalar(&self) -> Scalar {
        Scalar::from(self.inner)
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    fn from_str(secret_key: &str) -> Result<Self, Self::Err> {
        Self::from_hex(secret_key)
    }
}

impl Serialize for SecretKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_secret_hex())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secret_key: String = String::deserialize(deserializer)?;
        SecretKey::from_hex(secret_key).map_err(serde::de::Error::custom)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.inner.non_secure_erase();
        tracing::trace!("Secret Key dropped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_has_even_y() {
        for _ in 0..16 {
            let key = SecretKey::generate().canonical();
            assert_eq!(key.public_key().to_bytes()[0], 0x02);
        }
    }

    #[test]
    fn test_add_tweak_matches_point_addition() {
        let x = SecretKey::generate();
        let t = SecretKey::generate();

        let tweaked_secret = x.add_tweak(&t).unwrap();
        let tweaked_point = x.public_key().combine(&t.public_key()).unwrap();

        assert_eq!(tweaked_secret.public_key(), tweaked_point);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::generate();
        assert!(!format!("{key:?}").contains(&key.to_secret_hex()));
    }
}
