//! Schnorr signatures with adaptor support
//!
//! Raw-challenge schnorr over secp256k1: `e = SHA256(P_x ‖ R_x ‖ m)` with
//! plain (untagged) SHA256, matching the verifier of the reference mint.
//! This is deliberately not BIP-340; the two modes are not interchangeable.
//!
//! All of `P`, `R` and `T` are encoded x-only and lifted even-y. Private
//! keys, nonces and adaptor secrets are canonicalised (negated when their
//! point has odd y) before any equation is formed, so verification is
//! identical for every party.

use core::fmt;
use core::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{self, Parity, Scalar, XOnlyPublicKey};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::nuts::nut01::{PublicKey, SecretKey};
use crate::util::hex;
use crate::SECP256K1;

/// Schnorr error
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong byte length for a signature
    #[error("Invalid signature length: expected={expected}, found={found}")]
    InvalidSignatureLength {
        /// Expected size
        expected: usize,
        /// Actual size
        found: usize,
    },
    /// Challenge hash reduced to zero or exceeded the group order
    #[error("Challenge out of range")]
    ChallengeOutOfRange,
    /// `s` outside `[1, n-1]`
    #[error("Signature scalar out of range")]
    ScalarOutOfRange,
    /// `sG != R + eP`
    #[error("Invalid signature")]
    InvalidSignature,
    /// `s'G != R + T + eP`
    #[error("Invalid adaptor signature")]
    InvalidAdaptorSignature,
    /// `tG != T`
    #[error("Adaptor secret does not match adaptor point")]
    AdaptorSecretMismatch,
    /// Adaptor and completed signature do not share a nonce
    #[error("Nonce mismatch between adaptor and completed signature")]
    NonceMismatch,
    /// Hex error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

/// Schnorr signature `(s, R)`
///
/// Wire form is the 64-byte concatenation `R_x ‖ s`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: XOnlyPublicKey,
    s: [u8; 32],
}

impl Signature {
    /// Nonce point `R` (x-only, even y)
    #[inline]
    pub fn r(&self) -> XOnlyPublicKey {
        self.r
    }

    /// Scalar `s` as big-endian bytes
    #[inline]
    pub fn s(&self) -> [u8; 32] {
        self.s
    }

    /// Serialize as `R_x ‖ s`
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r.serialize());
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Parse from the 64-byte `R_x ‖ s` form
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        crate::ensure_xmint!(
            slice.len() == 64,
            Error::InvalidSignatureLength {
                expected: 64,
                found: slice.len(),
            }
        );

        let r = XOnlyPublicKey::from_slice(&slice[..32])?;
        let mut s = [0u8; 32];
        s.copy_from_slice(&slice[32..]);

        Ok(Self { r, s })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let signature: String = String::deserialize(deserializer)?;
        Self::from_str(&signature).map_err(serde::de::Error::custom)
    }
}

/// Adaptor signature `(s', R, T)`
///
/// Becomes a valid [`Signature`] once the adaptor secret `t` with `tG = T`
/// is subtracted from `s'`. Wire form is `R_x ‖ s' ‖ T_x` (96 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdaptorSignature {
    r: XOnlyPublicKey,
    s: [u8; 32],
    t: XOnlyPublicKey,
}

impl AdaptorSignature {
    /// Nonce point `R` (x-only, even y)
    #[inline]
    pub fn r(&self) -> XOnlyPublicKey {
        self.r
    }

    /// Adapted scalar `s'` as big-endian bytes
    #[inline]
    pub fn s(&self) -> [u8; 32] {
        self.s
    }

    /// Adaptor point `T` (x-only, even y)
    #[inline]
    pub fn t(&self) -> XOnlyPublicKey {
        self.t
    }

    /// Serialize as `R_x ‖ s' ‖ T_x`
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut bytes = [0u8; 96];
        bytes[..32].copy_from_slice(&self.r.serialize());
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64..].copy_from_slice(&self.t.serialize());
        bytes
    }

    /// Parse from the 96-byte `R_x ‖ s' ‖ T_x` form
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        crate::ensure_xmint!(
            slice.len() == 96,
            Error::InvalidSignatureLength {
                expected: 96,
                found: slice.len(),
            }
        );

        let r = XOnlyPublicKey::from_slice(&slice[..32])?;
        let mut s = [0u8; 32];
        s.copy_from_slice(&slice[32..64]);
        let t = XOnlyPublicKey::from_slice(&slice[64..])?;

        Ok(Self { r, s, t })
    }
}

impl fmt::Debug for AdaptorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdaptorSignature({})", self)
    }
}

impl fmt::Display for AdaptorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for AdaptorSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for AdaptorSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AdaptorSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let signature: String = String::deserialize(deserializer)?;
        Self::from_str(&signature).map_err(serde::de::Error::custom)
    }
}

/// Generate a canonical adaptor secret `t` and its point `T = tG`
///
/// `T` always has even y; generators negate `t` when needed so the
/// verification equations agree across parties.
pub fn generate_adaptor_secret() -> (SecretKey, PublicKey) {
    let t = SecretKey::generate().canonical();
    let point = t.public_key();
    (t, point)
}

/// `e = SHA256(P_x ‖ R_x ‖ m)` reduced into the scalar field
fn challenge(
    pubkey: &XOnlyPublicKey,
    nonce: &XOnlyPublicKey,
    digest: &[u8; 32],
) -> Result<Scalar, Error> {
    let mut bytes: Vec<u8> = Vec::with_capacity(96);
    bytes.extend_from_slice(&pubkey.serialize());
    bytes.extend_from_slice(&nonce.serialize());
    bytes.extend_from_slice(digest);

    let e = Sha256Hash::hash(&bytes).to_byte_array();
    Scalar::from_be_bytes(e).map_err(|_| Error::ChallengeOutOfRange)
}

fn message_digest(msg: &[u8]) -> [u8; 32] {
    Sha256Hash::hash(msg).to_byte_array()
}

/// Sign `msg` with `s = r + e·x`
pub fn sign(secret_key: &SecretKey, msg: &[u8]) -> Result<Signature, Error> {
    let digest = message_digest(msg);

    let x: secp256k1::SecretKey = *secret_key.canonical();
    let (pubkey_x, _) = x.x_only_public_key(&SECP256K1);

    let nonce: secp256k1::SecretKey = *SecretKey::generate().canonical();
    let (nonce_x, _) = nonce.x_only_public_key(&SECP256K1);

    let e = challenge(&pubkey_x, &nonce_x, &digest)?;

    // s = r + e·x mod n
    let s = x.mul_tweak(&e)?.add_tweak(&Scalar::from(nonce))?;

    Ok(Signature {
        r: nonce_x,
        s: s.secret_bytes(),
    })
}

/// Verify `sG == R + eP` (x-coordinates compared)
pub fn verify(pubkey: &PublicKey, msg: &[u8], signature: &Signature) -> Result<(), Error> {
    let digest = message_digest(msg);

    let pubkey_x = pubkey.x_only_public_key();
    let e = challenge(&pubkey_x, &signature.r, &digest)?;

    let s = secp256k1::SecretKey::from_slice(&signature.s)
        .map_err(|_| Error::ScalarOutOfRange)?;
    let sg = secp256k1::PublicKey::from_secret_key(&SECP256K1, &s);

    let r = secp256k1::PublicKey::from_x_only_public_key(signature.r, Parity::Even);
    let p = secp256k1::PublicKey::from_x_only_public_key(pubkey_x, Parity::Even);

    let rhs = r.combine(&p.mul_tweak(&SECP256K1, &e)?)?;

    if sg.x_only_public_key().0 == rhs.x_only_public_key().0 {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

/// Create an adaptor signature `s' = r + t + e·x`
pub fn adaptor_sign(
    secret_key: &SecretKey,
    msg: &[u8],
    adaptor_secret: &SecretKey,
) -> Result<AdaptorSignature, Error> {
    let digest = message_digest(msg);

    let x: secp256k1::SecretKey = *secret_key.canonical();
    let (pubkey_x, _) = x.x_only_public_key(&SECP256K1);

    let t: secp256k1::SecretKey = *adaptor_secret.canonical();
    let (t_x, _) = t.x_only_public_key(&SECP256K1);

    let nonce: secp256k1::SecretKey = *SecretKey::generate().canonical();
    let (nonce_x, _) = nonce.x_only_public_key(&SECP256K1);

    let e = challenge(&pubkey_x, &nonce_x, &digest)?;

    // s' = r + t + e·x mod n
    let s = x
        .mul_tweak(&e)?
        .add_tweak(&Scalar::from(nonce))?
        .add_tweak(&Scalar::from(t))?;

    Ok(AdaptorSignature {
        r: nonce_x,
        s: s.secret_bytes(),
        t: t_x,
    })
}

/// Verify `s'G == R + T + eP` (x-coordinates compared)
pub fn adaptor_verify(
    pubkey: &PublicKey,
    msg: &[u8],
    adaptor: &AdaptorSignature,
) -> Result<(), Error> {
    let digest = message_digest(msg);

    let pubkey_x = pubkey.x_only_public_key();
    let e = challenge(&pubkey_x, &adaptor.r, &digest)?;

    let s = secp256k1::SecretKey::from_slice(&adaptor.s)
        .map_err(|_| Error::ScalarOutOfRange)?;
    let sg = secp256k1::PublicKey::from_secret_key(&SECP256K1, &s);

    let r = secp256k1::PublicKey::from_x_only_public_key(adaptor.r, Parity::Even);
    let t = secp256k1::PublicKey::from_x_only_public_key(adaptor.t, Parity::Even);
    let p = secp256k1::PublicKey::from_x_only_public_key(pubkey_x, Parity::Even);

    let rhs = r.combine(&t)?.combine(&p.mul_tweak(&SECP256K1, &e)?)?;

    if sg.x_only_public_key().0 == rhs.x_only_public_key().0 {
        Ok(())
    } else {
        Err(Error::InvalidAdaptorSignature)
    }
}

/// Complete an adaptor signature: `(s' − t, R)`
///
/// Fails when `tG != T`.
pub fn complete_signature(
    adaptor: &AdaptorSignature,
    adaptor_secret: &SecretKey,
) -> Result<Signature, Error> {
    let t: secp256k1::SecretKey = *adaptor_secret.canonical();
    let (t_x, _) = t.x_only_public_key(&SECP256K1);

    if t_x != adaptor.t {
        return Err(Error::AdaptorSecretMismatch);
    }

    let s = secp256k1::SecretKey::from_slice(&adaptor.s)
        .map_err(|_| Error::ScalarOutOfRange)?
        .add_tweak(&Scalar::from(t.negate()))?;

    Ok(Signature {
        r: adaptor.r,
        s: s.secret_bytes(),
    })
}

/// Extract the adaptor secret from an adaptor signature and its completed
/// counterpart: `t = s' − s mod n`
///
/// Both must share the same nonce `R`; the recovered scalar is checked
/// against `T` and returned in canonical (even-y) form.
pub fn extract_secret(
    adaptor: &AdaptorSignature,
    signature: &Signature,
) -> Result<SecretKey, Error> {
    if signature.r != adaptor.r {
        return Err(Error::NonceMismatch);
    }

    let s = secp256k1::SecretKey::from_slice(&signature.s)
        .map_err(|_| Error::ScalarOutOfRange)?;

    let t = secp256k1::SecretKey::from_slice(&adaptor.s)
        .map_err(|_| Error::ScalarOutOfRange)?
        .add_tweak(&Scalar::from(s.negate()))?;

    let (t_x, parity) = t.x_only_public_key(&SECP256K1);
    if t_x != adaptor.t {
        let mut leaked = t.secret_bytes();
        leaked.zeroize();
        return Err(Error::AdaptorSecretMismatch);
    }

    let t = match parity {
        Parity::Even => t,
        _ => t.negate(),
    };

    Ok(t.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = SecretKey::generate();
        let msg = b"proof secret bytes";

        let signature = sign(&key, msg).unwrap();
        assert!(verify(&key.public_key(), msg, &signature).is_ok());

        // Wrong message
        assert!(verify(&key.public_key(), b"other message", &signature).is_err());

        // Wrong key
        let other = SecretKey::generate();
        assert!(verify(&other.public_key(), msg, &signature).is_err());
    }

    #[test]
    fn test_sign_verify_non_canonical_key() {
        // A key whose point has odd y must still produce verifiable
        // signatures through canonicalisation
        let mut key = SecretKey::generate();
        if key.public_key().to_bytes()[0] == 0x02 {
            key = SecretKey::from((*key).negate());
        }
        assert_eq!(key.public_key().to_bytes()[0], 0x03);

        let msg = b"odd y signer";
        let signature = sign(&key, msg).unwrap();
        assert!(verify(&key.public_key(), msg, &signature).is_ok());
    }

    #[test]
    fn test_signature_wire_round_trip() {
        let key = SecretKey::generate();
        let signature = sign(&key, b"wire").unwrap();

        let hex_str = signature.to_string();
        assert_eq!(hex_str.len(), 128);

        let parsed = Signature::from_str(&hex_str).unwrap();
        assert_eq!(signature, parsed);

        assert!(Signature::from_slice(&[0u8; 63]).is_err());
    }

    #[test]
    fn test_adaptor_round_trip() {
        let key = SecretKey::generate();
        let (t, big_t) = generate_adaptor_secret();
        let msg = b"adaptor secret message";

        let adaptor = adaptor_sign(&key, msg, &t).unwrap();
        assert!(adaptor_verify(&key.public_key(), msg, &adaptor).is_ok());

        // T is the x-only encoding of tG
        assert_eq!(adaptor.t(), big_t.x_only_public_key());

        let completed = complete_signature(&adaptor, &t).unwrap();
        assert!(verify(&key.public_key(), msg, &completed).is_ok());

        let extracted = extract_secret(&adaptor, &completed).unwrap();
        assert_eq!(extracted, t);
    }

    #[test]
    fn test_adaptor_mismatch_rejection() {
        let key = SecretKey::generate();
        let (t, _) = generate_adaptor_secret();
        let msg = b"mismatch";

        let adaptor = adaptor_sign(&key, msg, &t).unwrap();

        // Wrong message
        assert!(adaptor_verify(&key.public_key(), b"wrong", &adaptor).is_err());

        // Wrong key
        let other = SecretKey::generate();
        assert!(adaptor_verify(&other.public_key(), msg, &adaptor).is_err());

        // Wrong adaptor secret
        let (wrong_t, _) = generate_adaptor_secret();
        assert!(complete_signature(&adaptor, &wrong_t).is_err());

        // Tampered nonce
        let mut bytes = adaptor.to_bytes();
        bytes[..32].copy_from_slice(&SecretKey::generate().public_key().x_only_public_key().serialize());
        let tampered = AdaptorSignature::from_slice(&bytes).unwrap();
        assert!(adaptor_verify(&key.public_key(), msg, &tampered).is_err());
    }

    #[test]
    fn test_extract_requires_shared_nonce() {
        let key = SecretKey::generate();
        let (t, _) = generate_adaptor_secret();

        let adaptor = adaptor_sign(&key, b"msg", &t).unwrap();
        let unrelated = sign(&key, b"msg").unwrap();

        assert!(matches!(
            extract_secret(&adaptor, &unrelated),
            Err(Error::NonceMismatch)
        ));
    }

    #[test]
    fn test_completed_signature_differs_from_adaptor() {
        let key = SecretKey::generate();
        let (t, _) = generate_adaptor_secret();

        let adaptor = adaptor_sign(&key, b"msg", &t).unwrap();
        let completed = complete_signature(&adaptor, &t).unwrap();

        // The adapted scalar alone must not verify
        let premature = Signature {
            r: adaptor.r(),
            s: adaptor.s(),
        };
        assert!(verify(&key.public_key(), b"msg", &premature).is_err());
        assert_ne!(premature.s(), completed.s());
    }
}
