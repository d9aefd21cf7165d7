//! Blind Diffie-Hellmann key exchange
//!
//! The blind-signature scheme used to issue bearer tokens. The mint signs a
//! blinded commitment to the token secret and the receiving wallet unblinds
//! the response into a spendable proof.

use std::ops::Deref;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Parity, PublicKey as NormalizedPublicKey, Scalar, XOnlyPublicKey};
use thiserror::Error as ThisError;

#[cfg(feature = "wallet")]
use crate::nuts::nut00::BlindSignature;
#[cfg(feature = "wallet")]
use crate::nuts::nut01::Keys;
use crate::nuts::nut01::{PublicKey, SecretKey};
#[cfg(feature = "wallet")]
use crate::nuts::{Proof, Proofs};
#[cfg(feature = "wallet")]
use crate::secret::Secret;
use crate::SECP256K1;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// DHKE Error
#[derive(Debug, ThisError)]
pub enum Error {
    /// Hash to curve exhausted the counter space without finding a point
    #[error("No valid point found")]
    NoValidPoint,
    /// Mint does not have a key for amount
    #[error("No key for amount")]
    AmountKey,
    /// Token could not be validated
    #[error("Token not verified")]
    TokenNotVerified,
    /// NUT01 error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
}

/// Deterministically map a message to a curve point
///
/// `h = SHA256(DOMAIN ‖ msg)`, then the first `SHA256(h ‖ counter_le)` that
/// is a valid x-only coordinate is lifted to the even-y point. The output is
/// byte-identical across implementations.
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let msg_to_hash: Vec<u8> = [DOMAIN_SEPARATOR, message].concat();

    let msg_hash: [u8; 32] = Sha256Hash::hash(&msg_to_hash).to_byte_array();

    for counter in 0..=u32::MAX {
        let mut bytes_to_hash: Vec<u8> = Vec::with_capacity(36);
        bytes_to_hash.extend_from_slice(&msg_hash);
        bytes_to_hash.extend_from_slice(&counter.to_le_bytes());
        let hash: [u8; 32] = Sha256Hash::hash(&bytes_to_hash).to_byte_array();

        if let Ok(pk) = XOnlyPublicKey::from_slice(&hash) {
            return Ok(NormalizedPublicKey::from_x_only_public_key(pk, Parity::Even).into());
        }
    }

    Err(Error::NoValidPoint)
}

/// Blind Message
///
/// `B_ = Y + rG`
#[cfg(feature = "wallet")]
pub fn blind_message(
    secret: &[u8],
    blinding_factor: Option<SecretKey>,
) -> Result<(PublicKey, SecretKey), Error> {
    let y: PublicKey = hash_to_curve(secret)?;
    let r: SecretKey = blinding_factor.unwrap_or_else(SecretKey::generate);
    Ok((y.combine(&r.public_key())?, r))
}

/// Unblind Message
///
/// `C = C_ - rK`
#[cfg(feature = "wallet")]
pub fn unblind_message(
    // C_
    blinded_key: &PublicKey,
    r: &SecretKey,
    // K
    mint_pubkey: &PublicKey,
) -> Result<PublicKey, Error> {
    let r: Scalar = Scalar::from(r.deref().to_owned());

    // a = r * K
    let a: PublicKey = mint_pubkey.mul_tweak(&SECP256K1, &r)?.into();

    // C_ - a
    let a: PublicKey = a.negate(&SECP256K1).into();
    Ok(blinded_key.combine(&a)?)
}

/// Construct proofs from the mint's blind signatures
///
/// Signatures, blinding factors and secrets must share one order.
#[cfg(feature = "wallet")]
pub fn construct_proofs(
    promises: Vec<BlindSignature>,
    rs: Vec<SecretKey>,
    secrets: Vec<Secret>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    let mut proofs = vec![];
    for ((blinded_signature, r), secret) in promises.into_iter().zip(rs).zip(secrets) {
        let blinded_c: PublicKey = blinded_signature.c;
        let a: PublicKey = keys
            .amount_key(blinded_signature.amount)
            .ok_or(Error::AmountKey)?;

        let unblinded_signature: PublicKey = unblind_message(&blinded_c, &r, &a)?;

        let proof = Proof {
            amount: blinded_signature.amount,
            keyset_id: blinded_signature.keyset_id,
            secret,
            c: unblinded_signature,
            witness: None,
        };

        proofs.push(proof);
    }

    Ok(proofs)
}

/// Sign Blinded Message
///
/// `C_ = k * B_`, where:
/// * `k` is the private key of mint (one for each amount)
/// * `B_` is the blinded message
#[cfg(feature = "mint")]
#[inline]
pub fn sign_message(k: &SecretKey, blinded_message: &PublicKey) -> Result<PublicKey, Error> {
    let k: Scalar = Scalar::from(k.deref().to_owned());
    Ok(blinded_message.mul_tweak(&SECP256K1, &k)?.into())
}

/// Verify that an unblinded signature was produced by key `a`
#[cfg(feature = "mint")]
pub fn verify_message(
    a: &SecretKey,
    unblinded_message: PublicKey,
    msg: &[u8],
) -> Result<(), Error> {
    // Y
    let y: PublicKey = hash_to_curve(msg)?;

    // kY
    let expected: PublicKey = y.mul_tweak(&SECP256K1, &Scalar::from(a.deref().to_owned()))?.into();

    if unblinded_message == expected {
        return Ok(());
    }

    Err(Error::TokenNotVerified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex;

    #[test]
    fn test_hash_to_curve() {
        let secret = "0000000000000000000000000000000000000000000000000000000000000000";
        let sec_hex = hex::decode(secret).unwrap();

        let y = hash_to_curve(&sec_hex).unwrap();
        let expected_y = PublicKey::from_hex(
            "024cce997d3b518f739663b757deaec95bcd9473c30a14ac2fd04023a739d1a725",
        )
        .unwrap();
        assert_eq!(y, expected_y);

        let secret = "0000000000000000000000000000000000000000000000000000000000000001";
        let sec_hex = hex::decode(secret).unwrap();
        let y = hash_to_curve(&sec_hex).unwrap();
        let expected_y = PublicKey::from_hex(
            "022e7158e11c9506f1aa4248bf531298daa7febd6194f003edcd9b93ade6253acf",
        )
        .unwrap();
        assert_eq!(y, expected_y);

        // This message takes a few iterations of the loop before finding a
        // valid point
        let secret = "0000000000000000000000000000000000000000000000000000000000000002";
        let sec_hex = hex::decode(secret).unwrap();
        let y = hash_to_curve(&sec_hex).unwrap();
        let expected_y = PublicKey::from_hex(
            "026cdbe15362df59cd1dd3c9c11de8aedac2106eca69236ecd9fbe117af897be4f",
        )
        .unwrap();
        assert_eq!(y, expected_y);
    }

    #[test]
    fn test_hash_to_curve_deterministic() {
        let a = hash_to_curve(b"test_secret_123").unwrap();
        let b = hash_to_curve(b"test_secret_123").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes().len(), 33);
    }

    #[test]
    fn test_blind_message() {
        let message =
            hex::decode("d341ee4871f1f889041e63cf0d3823c713eea6aff01e80f1719f08f9e5be98f6")
                .unwrap();
        let sec: SecretKey =
            SecretKey::from_hex("99fce58439fc37412ab3468b73db0569322588f62fb3a49182d67e23d877824a")
                .unwrap();

        let (b, r) = blind_message(&message, Some(sec.clone())).unwrap();

        assert_eq!(sec, r);
        assert_eq!(
            b,
            PublicKey::from_hex(
                "033b1a9737a40cc3fd9b6af4b723632b76a67a36782596304612a6c2bfb5197e6d"
            )
            .unwrap()
        );

        let message =
            hex::decode("f1aaf16c2239746f369572c0784d9dd3d032d952c2d992175873fb58fae31a60")
                .unwrap();
        let sec: SecretKey =
            SecretKey::from_hex("f78476ea7cc9ade20f9e05e58a804cf19533f03ea805ece5fee88c8e2874ba50")
                .unwrap();

        let (b, r) = blind_message(&message, Some(sec.clone())).unwrap();

        assert_eq!(sec, r);
        assert_eq!(
            b,
            PublicKey::from_hex(
                "029bdf2d716ee366eddf599ba252786c1033f47e230248a4612a5670ab931f1763"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_unblind_message() {
        let blinded_key = PublicKey::from_hex(
            "02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2",
        )
        .unwrap();

        let r =
            SecretKey::from_hex("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();
        let a = PublicKey::from_hex(
            "020000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();

        let unblinded = unblind_message(&blinded_key, &r, &a).unwrap();

        assert_eq!(
            PublicKey::from_hex(
                "03c724d7e6a5443b39ac8acf11f40420adc4f99a02e7cc1b57703d9391f6d129cd"
            )
            .unwrap(),
            unblinded
        );
    }

    #[test]
    fn test_blinded_dhke_round_trip() {
        // a
        let bob_sec = SecretKey::generate();

        // A
        let bob_pub = bob_sec.public_key();

        let x = Secret::generate();

        // B_
        let (blinded, r) = blind_message(&x.to_bytes(), None).unwrap();

        // C_
        let signed = sign_message(&bob_sec, &blinded).unwrap();

        // C
        let c = unblind_message(&signed, &r, &bob_pub).unwrap();

        assert!(verify_message(&bob_sec, c, &x.to_bytes()).is_ok());

        // C == kY
        let y = hash_to_curve(&x.to_bytes()).unwrap();
        let ky = sign_message(&bob_sec, &y).unwrap();
        assert_eq!(c, ky);
    }
}
