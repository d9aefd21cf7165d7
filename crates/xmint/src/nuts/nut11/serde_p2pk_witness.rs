//! Serde utils for P2PK Witness
//!
//! The witness rides in the proof's `witness` field as a stringified JSON
//! object, embedded verbatim.

use serde::{de, ser, Deserialize, Deserializer, Serializer};

use super::P2PKWitness;

/// Serialize [P2PKWitness] as stringified JSON
pub fn serialize<S>(witness: &P2PKWitness, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let witness = serde_json::to_string(witness).map_err(ser::Error::custom)?;
    serializer.serialize_str(&witness)
}

/// Deserialize [P2PKWitness] from stringified JSON
pub fn deserialize<'de, D>(deserializer: D) -> Result<P2PKWitness, D::Error>
where
    D: Deserializer<'de>,
{
    let witness: String = String::deserialize(deserializer)?;
    serde_json::from_str(&witness).map_err(de::Error::custom)
}
