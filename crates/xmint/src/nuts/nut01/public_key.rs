use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use bitcoin::secp256k1::{self, Parity, XOnlyPublicKey};
use serde::{Deserialize, Deserializer, Serialize};

use super::Error;
use crate::schnorr::{self, Signature};

/// PublicKey
///
/// Wire form is the 33-byte compressed SEC1 encoding. X-only (32-byte)
/// inputs are lifted to the even-y point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    inner: secp256k1::PublicKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Deref for PublicKey {
    type Target = secp256k1::PublicKey;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<secp256k1::PublicKey> for PublicKey {
    fn from(inner: secp256k1::PublicKey) -> Self {
        Self { inner }
    }
}

impl PublicKey {
    /// Parse from `bytes`
    #[inline]
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::PublicKey::from_slice(slice)?,
        })
    }

    /// Parse from `hex` string (33-byte compressed encoding)
    #[inline]
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let hex: &str = hex.as_ref();

        if hex.len() != 33 * 2 {
            return Err(Error::InvalidPublicKeySize {
                expected: 33,
                found: hex.len() / 2,
            });
        }

        Ok(Self {
            inner: secp256k1::PublicKey::from_str(hex)?,
        })
    }

    /// Lift a 32-byte x-only encoding to the even-y point
    #[inline]
    pub fn from_x_only_slice(slice: &[u8]) -> Result<Self, Error> {
        let x_only = XOnlyPublicKey::from_slice(slice)?;
        Ok(Self {
            inner: secp256k1::PublicKey::from_x_only_public_key(x_only, Parity::Even),
        })
    }

    /// Parse from `hex`, accepting either the 33-byte compressed or the
    /// 32-byte x-only encoding
    pub fn from_hex_lenient<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let hex: &str = hex.as_ref();

        match hex.len() {
            66 => Self::from_hex(hex),
            64 => {
                let bytes = crate::util::hex::decode(hex)
                    .map_err(|_| secp256k1::Error::InvalidPublicKey)?;
                Self::from_x_only_slice(&bytes)
            }
            _ => Err(Error::InvalidPublicKeySize {
                expected: 33,
                found: hex.len() / 2,
            }),
        }
    }

    /// [`PublicKey`] to 33 bytes
    #[inline]
    pub fn to_bytes(&self) -> [u8; 33] {
        self.inner.serialize()
    }

    /// To [`XOnlyPublicKey`]
    #[inline]
    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.inner.x_only_public_key().0
    }

    /// Get public key as `hex` string
    #[inline]
    pub fn to_hex(&self) -> String {
        self.inner.to_string()
    }

    /// Point addition: `self + other`
    #[inline]
    pub fn combine(&self, other: &PublicKey) -> Result<PublicKey, Error> {
        Ok(self.inner.combine(&other.inner)?.into())
    }

    /// Verify a raw-challenge schnorr signature on `msg`
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), Error> {
        schnorr::verify(self, msg, sig)?;
        Ok(())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hex)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let public_key: String = String::deserialize(deserializer)?;
        Self::from_hex(public_key).map_err(serde::de::Error::custom)
    }
}
