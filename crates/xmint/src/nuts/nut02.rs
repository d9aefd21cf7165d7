//! NUT-02: Keysets and keyset ID
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use core::fmt;
use core::str::FromStr;
use std::array::TryFromSliceError;
#[cfg(feature = "mint")]
use std::collections::BTreeMap;

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::Hash;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, VecSkipError};
use thiserror::Error;

use super::nut01::Keys;
#[cfg(feature = "mint")]
use super::nut01::{MintKeyPair, MintKeys};
use crate::nuts::nut00::CurrencyUnit;
use crate::util::hex;
use crate::Amount;

/// NUT02 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Hex Error
    #[error(transparent)]
    HexError(#[from] hex::Error),
    /// Keyset length error
    #[error("NUT02: ID length invalid")]
    Length,
    /// Unknown version
    #[error("NUT02: Unknown Version")]
    UnknownVersion,
    /// Slice Error
    #[error(transparent)]
    Slice(#[from] TryFromSliceError),
}

/// Keyset version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySetVersion {
    /// Current Version 00
    Version00,
}

impl KeySetVersion {
    /// [`KeySetVersion`] to byte
    pub fn to_byte(&self) -> u8 {
        match self {
            Self::Version00 => 0,
        }
    }

    /// [`KeySetVersion`] from byte
    pub fn from_byte(byte: &u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(Self::Version00),
            _ => Err(Error::UnknownVersion),
        }
    }
}

impl fmt::Display for KeySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySetVersion::Version00 => f.write_str("00"),
        }
    }
}

/// A keyset ID is an identifier for a specific keyset. It can be derived by
/// anyone who knows the set of public keys of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    version: KeySetVersion,
    id: [u8; Self::BYTELEN],
}

impl Id {
    const STRLEN: usize = 14;
    const BYTELEN: usize = 7;

    /// [`Id`] to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        [vec![self.version.to_byte()], self.id.to_vec()].concat()
    }

    /// [`Id`] from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::BYTELEN + 1 {
            return Err(Error::Length);
        }

        Ok(Self {
            version: KeySetVersion::from_byte(&bytes[0])?,
            id: bytes[1..].try_into()?,
        })
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{}{}", self.version, hex::encode(self.id)))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(Error::Length);
        }

        Ok(Self {
            version: KeySetVersion::Version00,
            id: hex::decode(&s[2..])?
                .try_into()
                .map_err(|_| Error::Length)?,
        })
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("Expecting a 14 char hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Id::from_str(v).map_err(|e| match e {
                    Error::Length => E::custom(format!(
                        "Invalid Length: Expected {}, got {}: {}",
                        Id::STRLEN,
                        v.len(),
                        v
                    )),
                    _ => E::custom(e),
                })
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

impl From<&Keys> for Id {
    /// Derive the keyset id from the set of public keys:
    /// sort by amount, concatenate the compressed keys, SHA256, take the
    /// first 14 hex characters, prefix with the version byte.
    fn from(map: &Keys) -> Self {
        let mut keys: Vec<(&Amount, &super::PublicKey)> = map.iter().collect();

        keys.sort_by_key(|(amt, _v)| *amt);

        let pubkeys_concat: Vec<u8> = keys
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = Sha256::hash(&pubkeys_concat);
        let hex_of_hash = hex::encode(hash.to_byte_array());

        Self {
            version: KeySetVersion::Version00,
            id: hex::decode(&hex_of_hash[0..Self::STRLEN])
                .expect("Keys hash could not be hex decoded")
                .try_into()
                .expect("Invalid length of hex id"),
        }
    }
}

/// Mint Keysets [NUT-02]
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Set of keyset infos the mint has issued keys for
    #[serde_as(as = "VecSkipError<_>")]
    pub keysets: Vec<KeySetInfo>,
}

/// Keyset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`Keys`]
    pub keys: Keys,
}

#[cfg(feature = "mint")]
impl From<MintKeySet> for KeySet {
    fn from(keyset: MintKeySet) -> Self {
        Self {
            id: keyset.id,
            unit: keyset.unit,
            keys: Keys::from(keyset.keys),
        }
    }
}

/// KeySetInfo
#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset state
    /// Mint will only sign from an active keyset
    pub active: bool,
    /// Input Fee PPK
    #[serde(default = "default_input_fee_ppk")]
    pub input_fee_ppk: u64,
}

fn default_input_fee_ppk() -> u64 {
    0
}

/// MintKeyset
#[cfg(feature = "mint")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintKeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Keyset [`MintKeys`]
    pub keys: MintKeys,
}

#[cfg(feature = "mint")]
impl MintKeySet {
    /// Generate a new [`MintKeySet`] with random keys, one per power-of-two
    /// denomination up to `2^(max_order - 1)`
    pub fn generate(unit: CurrencyUnit, max_order: u8) -> Self {
        let mut map = BTreeMap::new();
        for i in 0..max_order {
            let amount = Amount::from(2_u64.pow(i as u32));
            map.insert(amount, MintKeyPair::generate());
        }

        let keys = MintKeys::new(map);
        let pub_keys = Keys::from(keys.clone());
        Self {
            id: (&pub_keys).into(),
            unit,
            keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_str_round_trip() {
        let id = Id::from_str("009a1f293253e41e").unwrap();
        assert_eq!(id.to_string(), "009a1f293253e41e");
        assert_eq!(Id::from_bytes(&id.to_bytes()).unwrap(), id);
    }

    #[test]
    fn test_id_rejects_bad_length() {
        assert!(Id::from_str("009a1f").is_err());
        assert!(Id::from_bytes(&[0u8; 3]).is_err());
    }

    #[cfg(feature = "mint")]
    #[test]
    fn test_keyset_id_is_stable_over_keys() {
        let keyset = MintKeySet::generate(CurrencyUnit::Sat, 8);
        let keys = Keys::from(keyset.keys.clone());

        assert_eq!(Id::from(&keys), keyset.id);
        assert_eq!(keys.keys().len(), 8);
    }
}
