//! NUT-11: Pay to Public Key (P2PK)
//!
//! <https://github.com/cashubtc/nuts/blob/main/11.md>

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::Witness;
use super::nut01::PublicKey;
use super::{Kind, Nut10Secret, Proof, Proofs, SecretKey};
use crate::schnorr::Signature;
use crate::util::{hex, unix_time};

pub mod serde_p2pk_witness;

/// Nut11 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Incorrect secret kind
    #[error("Secret is not a p2pk secret")]
    IncorrectSecretKind,
    /// Incorrect witness kind
    #[error("Witness is not a p2pk witness")]
    IncorrectWitnessKind,
    /// Witness signature is not valid
    #[error("Invalid signature")]
    InvalidSignature,
    /// Unknown tag in P2PK secret
    #[error("Unknown tag P2PK secret")]
    UnknownTag,
    /// Unknown Sigflag
    #[error("Unknown sigflag")]
    UnknownSigFlag,
    /// P2PK spend conditions not met
    #[error("P2PK spend conditions are not met")]
    SpendConditionsNotMet,
    /// Witness signatures not provided
    #[error("Witness signatures not provided")]
    SignaturesNotProvided,
    /// Duplicate signature from same pubkey
    #[error("Duplicate signature from the same pubkey detected")]
    DuplicateSignature,
    /// Parse int error
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    /// From hex error
    #[error(transparent)]
    HexError(#[from] hex::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Schnorr error
    #[error(transparent)]
    Schnorr(#[from] crate::schnorr::Error),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
    /// NUT10 Error
    #[error(transparent)]
    NUT10(#[from] crate::nuts::nut10::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
}

/// P2PK Witness
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2PKWitness {
    /// Signatures, each the 128-hex-char `R ‖ s` form
    pub signatures: Vec<String>,
    /// Optional preimage for hash-locked extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
}

impl P2PKWitness {
    /// Check if witness is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Proof {
    /// Sign [Proof]
    ///
    /// The signed message is the exact serialised secret string of the
    /// proof.
    pub fn sign_p2pk(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let msg: Vec<u8> = self.secret.to_bytes();
        let signature: Signature = secret_key.sign(&msg)?;

        self.add_witness_signature(signature);

        Ok(())
    }

    /// Attach a pre-computed witness signature (e.g. a completed adaptor
    /// signature) to the [Proof]
    pub fn add_witness_signature(&mut self, signature: Signature) {
        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };
    }

    /// Verify P2PK signature on [Proof]
    pub fn verify_p2pk(&self) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        let spending_conditions: Conditions = secret
            .secret_data()
            .tags()
            .cloned()
            .unwrap_or_default()
            .try_into()?;
        let msg: &[u8] = self.secret.as_bytes();

        let mut verified_pubkeys = HashSet::new();

        let witness_signatures = match &self.witness {
            Some(witness) => witness.signatures(),
            None => None,
        };

        let witness_signatures = witness_signatures.ok_or(Error::SignaturesNotProvided)?;

        let mut pubkeys = spending_conditions.pubkeys.clone().unwrap_or_default();

        // After the locktime has passed refund keys take over; with no
        // refund keys the proof becomes anyone-can-spend.
        let now = unix_time();

        if let Some(locktime) = spending_conditions.locktime {
            if now >= locktime {
                if let Some(refund_keys) = spending_conditions.refund_keys.clone() {
                    for s in witness_signatures.iter() {
                        let sig =
                            Signature::from_str(s).map_err(|_| Error::InvalidSignature)?;
                        for v in &refund_keys {
                            if v.verify(msg, &sig).is_ok() {
                                return Ok(());
                            }
                        }
                    }

                    return Err(Error::SpendConditionsNotMet);
                }

                return Ok(());
            }
        }

        if secret.kind().eq(&Kind::P2PK) {
            pubkeys.push(PublicKey::from_str(secret.secret_data().data())?);
        } else {
            return Err(Error::IncorrectSecretKind);
        }

        for signature in witness_signatures.iter() {
            let sig = Signature::from_str(signature)?;

            for v in &pubkeys {
                if v.verify(msg, &sig).is_ok() {
                    // A pubkey is only counted once
                    if !verified_pubkeys.insert(*v) {
                        return Err(Error::DuplicateSignature);
                    }
                } else {
                    tracing::debug!(
                        "Could not verify signature: {sig} on message: {}",
                        self.secret
                    )
                }
            }
        }

        let valid_sigs = verified_pubkeys.len() as u64;

        if valid_sigs >= spending_conditions.num_sigs.unwrap_or(1) {
            return Ok(());
        }

        Err(Error::SpendConditionsNotMet)
    }
}

/// Returns the count of valid signatures; each public key is only counted
/// once
pub fn valid_signatures(
    msg: &[u8],
    pubkeys: &[PublicKey],
    signatures: &[Signature],
) -> Result<u64, Error> {
    let mut verified_pubkeys = HashSet::new();

    for pubkey in pubkeys {
        for signature in signatures {
            if pubkey.verify(msg, signature).is_ok() && !verified_pubkeys.insert(*pubkey) {
                return Err(Error::DuplicateSignature);
            }
        }
    }

    Ok(verified_pubkeys.len() as u64)
}

/// Joint message authorised by a single `SIG_ALL` witness: the
/// concatenation of all input secret strings in input order
pub fn sig_all_message(inputs: &Proofs) -> Vec<u8> {
    inputs
        .iter()
        .flat_map(|proof| proof.secret.as_bytes().to_vec())
        .collect()
}

/// Spending conditions of an input set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforceSigFlag {
    /// Strongest sig flag required by the inputs
    pub sig_flag: SigFlag,
    /// Public keys allowed to sign
    pub pubkeys: HashSet<PublicKey>,
    /// Number of signatures required
    pub sigs_required: u64,
}

/// Scan an input set for the sig flag and key set it enforces
///
/// `SIG_ALL` on any input dominates `SIG_INPUTS`.
pub fn enforce_sig_flag(proofs: &Proofs) -> EnforceSigFlag {
    let mut sig_flag = SigFlag::SigInputs;
    let mut pubkeys = HashSet::new();
    let mut sigs_required = 1;

    for proof in proofs {
        if let Ok(secret) = Nut10Secret::try_from(&proof.secret) {
            if secret.kind().eq(&Kind::P2PK) {
                if let Ok(pubkey) = PublicKey::from_str(secret.secret_data().data()) {
                    pubkeys.insert(pubkey);
                }
            }

            if let Some(tags) = secret.secret_data().tags() {
                if let Ok(conditions) = Conditions::try_from(tags.clone()) {
                    if conditions.sig_flag.eq(&SigFlag::SigAll) {
                        sig_flag = SigFlag::SigAll;
                    }

                    if let Some(sigs) = conditions.num_sigs {
                        if sigs > sigs_required {
                            sigs_required = sigs;
                        }
                    }

                    if let Some(pubkeys_tag) = conditions.pubkeys {
                        pubkeys.extend(pubkeys_tag);
                    }
                }
            }
        }
    }

    EnforceSigFlag {
        sig_flag,
        pubkeys,
        sigs_required,
    }
}

/// P2PK and refund signature flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigFlag {
    /// Requires valid signatures on all inputs.
    /// It is the default signature flag.
    #[default]
    #[serde(rename = "SIG_INPUTS")]
    SigInputs,
    /// Requires one valid witness covering all inputs jointly
    #[serde(rename = "SIG_ALL")]
    SigAll,
}

impl fmt::Display for SigFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SigAll => write!(f, "SIG_ALL"),
            Self::SigInputs => write!(f, "SIG_INPUTS"),
        }
    }
}

impl FromStr for SigFlag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "SIG_ALL" => Ok(Self::SigAll),
            "SIG_INPUTS" => Ok(Self::SigInputs),
            _ => Err(Error::UnknownSigFlag),
        }
    }
}

const TAG_SIGFLAG: &str = "sigflag";
const TAG_N_SIGS: &str = "n_sigs";
const TAG_PUBKEYS: &str = "pubkeys";
const TAG_LOCKTIME: &str = "locktime";
const TAG_REFUND: &str = "refund";

/// Additional spending conditions carried as tags in a P2PK secret
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conditions {
    /// Unix locktime after which refund keys (or anyone) can spend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u64>,
    /// Additional public keys allowed to sign
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkeys: Option<Vec<PublicKey>>,
    /// Keys that can spend after the locktime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_keys: Option<Vec<PublicKey>>,
    /// Number of signatures required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sigs: Option<u64>,
    /// Signature flag
    pub sig_flag: SigFlag,
}

impl Conditions {
    /// Create new [`Conditions`]
    pub fn new(
        locktime: Option<u64>,
        pubkeys: Option<Vec<PublicKey>>,
        refund_keys: Option<Vec<PublicKey>>,
        num_sigs: Option<u64>,
        sig_flag: Option<SigFlag>,
    ) -> Self {
        Self {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag: sig_flag.unwrap_or_default(),
        }
    }
}

impl From<Conditions> for Vec<Vec<String>> {
    fn from(conditions: Conditions) -> Vec<Vec<String>> {
        let Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
        } = conditions;

        let mut tags = Vec::new();

        tags.push(vec![TAG_SIGFLAG.to_string(), sig_flag.to_string()]);

        if let Some(num_sigs) = num_sigs {
            tags.push(vec![TAG_N_SIGS.to_string(), num_sigs.to_string()]);
        }
        if let Some(pubkeys) = pubkeys {
            let mut tag = vec![TAG_PUBKEYS.to_string()];
            tag.extend(pubkeys.iter().map(|p| p.to_hex()));
            tags.push(tag);
        }
        if let Some(locktime) = locktime {
            tags.push(vec![TAG_LOCKTIME.to_string(), locktime.to_string()]);
        }
        if let Some(refund_keys) = refund_keys {
            let mut tag = vec![TAG_REFUND.to_string()];
            tag.extend(refund_keys.iter().map(|p| p.to_hex()));
            tags.push(tag);
        }

        tags
    }
}

impl TryFrom<Vec<Vec<String>>> for Conditions {
    type Error = Error;

    fn try_from(tags: Vec<Vec<String>>) -> Result<Conditions, Self::Error> {
        let mut conditions = Conditions::default();

        for tag in tags {
            let (kind, values) = tag.split_first().ok_or(Error::UnknownTag)?;

            match kind.as_str() {
                TAG_SIGFLAG => {
                    let flag = values.first().ok_or(Error::UnknownSigFlag)?;
                    conditions.sig_flag = SigFlag::from_str(flag)?;
                }
                TAG_N_SIGS => {
                    let n = values.first().ok_or(Error::UnknownTag)?;
                    conditions.num_sigs = Some(n.parse()?);
                }
                TAG_PUBKEYS => {
                    let pubkeys = values
                        .iter()
                        .map(PublicKey::from_hex)
                        .collect::<Result<Vec<PublicKey>, _>>()?;
                    conditions.pubkeys = Some(pubkeys);
                }
                TAG_LOCKTIME => {
                    let locktime = values.first().ok_or(Error::UnknownTag)?;
                    conditions.locktime = Some(locktime.parse()?);
                }
                TAG_REFUND => {
                    let refund_keys = values
                        .iter()
                        .map(PublicKey::from_hex)
                        .collect::<Result<Vec<PublicKey>, _>>()?;
                    conditions.refund_keys = Some(refund_keys);
                }
                // Unknown tags are committed to by the signature but carry
                // no meaning here
                _ => {}
            }
        }

        Ok(conditions)
    }
}

/// Spending conditions
///
/// Defined in [NUT10](https://github.com/cashubtc/nuts/blob/main/10.md)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpendingConditions {
    /// NUT11 Spending conditions
    ///
    /// Defined in [NUT11](https://github.com/cashubtc/nuts/blob/main/11.md)
    P2PKConditions {
        /// The public key of the recipient of the locked ecash
        data: PublicKey,
        /// Additional Optional Spending [`Conditions`]
        conditions: Option<Conditions>,
    },
}

impl SpendingConditions {
    /// New P2PK [SpendingConditions]
    pub fn new_p2pk(pubkey: PublicKey, conditions: Option<Conditions>) -> Self {
        Self::P2PKConditions {
            data: pubkey,
            conditions,
        }
    }

    /// Kind of [SpendingConditions]
    pub fn kind(&self) -> Kind {
        match self {
            Self::P2PKConditions { .. } => Kind::P2PK,
        }
    }

    /// Number of signatures required to unlock
    pub fn num_sigs(&self) -> Option<u64> {
        match self {
            Self::P2PKConditions { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.num_sigs)
            }
        }
    }

    /// Public keys of locked [`Proof`]
    pub fn pubkeys(&self) -> Option<Vec<PublicKey>> {
        match self {
            Self::P2PKConditions { data, conditions } => {
                let mut pubkeys = vec![*data];
                if let Some(conditions) = conditions {
                    pubkeys.extend(conditions.pubkeys.clone().unwrap_or_default());
                }
                let unique_pubkeys: HashSet<_> = pubkeys.into_iter().collect();
                Some(unique_pubkeys.into_iter().collect())
            }
        }
    }

    /// Signature flag of [SpendingConditions]
    pub fn sig_flag(&self) -> SigFlag {
        match self {
            Self::P2PKConditions { conditions, .. } => conditions
                .as_ref()
                .map(|c| c.sig_flag)
                .unwrap_or_default(),
        }
    }
}

impl From<SpendingConditions> for Nut10Secret {
    fn from(conditions: SpendingConditions) -> Nut10Secret {
        match conditions {
            SpendingConditions::P2PKConditions { data, conditions } => Nut10Secret::new(
                Kind::P2PK,
                data.to_hex(),
                conditions.map(Into::<Vec<Vec<String>>>::into),
            ),
        }
    }
}

impl TryFrom<Nut10Secret> for SpendingConditions {
    type Error = Error;
    fn try_from(secret: Nut10Secret) -> Result<SpendingConditions, Error> {
        match secret.kind() {
            Kind::P2PK => Ok(SpendingConditions::P2PKConditions {
                data: PublicKey::from_str(secret.secret_data().data())?,
                conditions: secret
                    .secret_data()
                    .tags()
                    .cloned()
                    .map(TryInto::try_into)
                    .transpose()?,
            }),
            Kind::HTLC => Err(Error::IncorrectSecretKind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuts::Id;
    use crate::secret::Secret;
    use crate::Amount;

    fn locked_proof(recipient: &PublicKey, conditions: Option<Conditions>) -> Proof {
        let nut10: Nut10Secret =
            SpendingConditions::new_p2pk(*recipient, conditions).into();
        let secret: Secret = nut10.try_into().unwrap();
        Proof::new(
            Amount::from(8),
            Id::from_str("009a1f293253e41e").unwrap(),
            secret,
            // Unblinded signature is irrelevant for witness checks
            SecretKey::generate().public_key(),
        )
    }

    #[test]
    fn test_sign_and_verify_proof() {
        let key = SecretKey::generate();
        let mut proof = locked_proof(&key.public_key(), None);

        assert!(matches!(
            proof.verify_p2pk(),
            Err(Error::SignaturesNotProvided)
        ));

        proof.sign_p2pk(key).unwrap();
        assert!(proof.verify_p2pk().is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_signer() {
        let recipient = SecretKey::generate();
        let intruder = SecretKey::generate();

        let mut proof = locked_proof(&recipient.public_key(), None);
        proof.sign_p2pk(intruder).unwrap();

        assert!(proof.verify_p2pk().is_err());
    }

    #[test]
    fn test_witness_signature_is_128_hex() {
        let key = SecretKey::generate();
        let mut proof = locked_proof(&key.public_key(), None);
        proof.sign_p2pk(key).unwrap();

        let signatures = proof.witness.as_ref().unwrap().signatures().unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].len(), 128);
    }

    #[test]
    fn test_conditions_tag_round_trip() {
        let pubkey = SecretKey::generate().public_key();
        let conditions = Conditions::new(
            Some(99999),
            Some(vec![pubkey]),
            None,
            Some(2),
            Some(SigFlag::SigAll),
        );

        let tags: Vec<Vec<String>> = conditions.clone().into();
        let parsed = Conditions::try_from(tags).unwrap();

        assert_eq!(conditions, parsed);
    }

    #[test]
    fn test_enforce_sig_flag_prefers_sig_all() {
        let key = SecretKey::generate();
        let sig_inputs = locked_proof(&key.public_key(), None);
        let sig_all = locked_proof(
            &key.public_key(),
            Some(Conditions::new(None, None, None, None, Some(SigFlag::SigAll))),
        );

        let enforced = enforce_sig_flag(&vec![sig_inputs.clone()]);
        assert_eq!(enforced.sig_flag, SigFlag::SigInputs);

        let enforced = enforce_sig_flag(&vec![sig_inputs, sig_all]);
        assert_eq!(enforced.sig_flag, SigFlag::SigAll);
        assert!(enforced.pubkeys.contains(&key.public_key()));
    }

    #[test]
    fn test_sig_all_message_is_order_sensitive() {
        let key = SecretKey::generate();
        let a = locked_proof(&key.public_key(), None);
        let b = locked_proof(&key.public_key(), None);

        let forward = sig_all_message(&vec![a.clone(), b.clone()]);
        let reverse = sig_all_message(&vec![b, a]);

        assert_ne!(forward, reverse);
    }
}
