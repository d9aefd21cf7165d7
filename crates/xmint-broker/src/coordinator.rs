//! Swap coordinator
//!
//! Drives one peer-to-peer atomic swap through its state machine. Each
//! party funds P2PK-locked proofs on its own mint for the counterparty;
//! the witness for every locked proof is an adaptor signature by the
//! receiving party over that proof's secret, all sharing one adaptor
//! point `T`. The responder claims first by completing its adaptors with
//! `t`; the published completed signature lets the initiator extract `t`
//! and claim in turn. After the responder's claim the initiator can always
//! complete, which is the atomicity guarantee.

use core::fmt;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use xmint::mint_url::MintUrl;
use xmint::nuts::nut11::Conditions;
use xmint::nuts::{
    Proofs, PublicKey, SecretKey, SigFlag, SpendingConditions,
};
use xmint::schnorr::{
    self, adaptor_sign, adaptor_verify, complete_signature, extract_secret, AdaptorSignature,
    Signature,
};
use xmint::secret::Secret;
use xmint::util::unix_time;
use xmint::{Amount, Nut10Secret};
use xmint_wallet::Wallet;

use crate::error::Error;

/// States of a swap; the seven steps are only reachable in declared order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapState {
    /// Nothing has happened yet
    Idle,
    /// Adaptor secret generated, terms fixed
    Negotiating,
    /// Lock secrets for both sides recorded
    SecretsCreated,
    /// Both adaptor signature sets exchanged
    AdaptorSigsExchanged,
    /// Adaptor signatures verified against both parties
    Verified,
    /// Responder has claimed on the initiator's mint
    Claiming,
    /// Adaptor secret extracted from the published signature
    Extracting,
    /// Both legs settled
    Completed,
    /// Swap failed; nothing further will settle
    Failed,
    /// Abandoned before any mint interaction
    Cancelled,
    /// Expiry passed before completion
    TimedOut,
}

impl SwapState {
    /// Whether the swap can still be abandoned with no on-mint effect
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            Self::Idle
                | Self::Negotiating
                | Self::SecretsCreated
                | Self::AdaptorSigsExchanged
                | Self::Verified
        )
    }

    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Idle => "IDLE",
            Self::Negotiating => "NEGOTIATING",
            Self::SecretsCreated => "SECRETS_CREATED",
            Self::AdaptorSigsExchanged => "ADAPTOR_SIGS_EXCHANGED",
            Self::Verified => "VERIFIED",
            Self::Claiming => "CLAIMING",
            Self::Extracting => "EXTRACTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::TimedOut => "TIMEOUT",
        };
        write!(f, "{state}")
    }
}

/// One side of a swap
#[derive(Debug, Clone)]
pub struct SwapParty {
    /// Public key the counterparty's outputs are signed for
    pub pubkey: PublicKey,
    /// Private key, present for locally-held parties
    pub secret_key: Option<SecretKey>,
    /// Mint this party funds its leg on
    pub mint_url: MintUrl,
    /// Amount this party puts in
    pub amount: Amount,
}

impl SwapParty {
    /// Party from a private key
    pub fn from_secret_key(secret_key: SecretKey, mint_url: MintUrl, amount: Amount) -> Self {
        Self {
            pubkey: secret_key.public_key(),
            secret_key: Some(secret_key),
            mint_url,
            amount,
        }
    }
}

/// Observable events of a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapEvent {
    /// Swap created with an adaptor point
    Created {
        /// Adaptor point `T`
        adaptor_point: PublicKey,
    },
    /// Lock secrets recorded for both sides
    SecretsCreated,
    /// Adaptor signatures recorded for both sides
    AdaptorSignaturesCreated,
    /// Both adaptor signature sets verified
    AdaptorSignaturesVerified,
    /// Responder claimed; completed signatures are now public
    ResponderClaimed,
    /// Adaptor secret recovered from a published signature
    SecretExtracted,
    /// Initiator claimed; swap settled
    InitiatorClaimed,
    /// Swap failed
    Failed {
        /// Captured reason
        reason: String,
    },
    /// Swap cancelled before claiming
    Cancelled,
    /// Swap expired
    TimedOut,
}

/// Coordinator for one atomic swap
pub struct SwapCoordinator {
    state: SwapState,
    initiator: SwapParty,
    responder: SwapParty,
    fee: Amount,
    expiry_time: u64,
    /// `t`; shared between the parties of this coordinator
    adaptor_secret: Option<SecretKey>,
    /// `T = tG`
    adaptor_point: Option<PublicKey>,
    /// Secrets locking the initiator's outputs to the responder
    initiator_secrets: Vec<Secret>,
    /// Secrets locking the responder's outputs to the initiator
    responder_secrets: Vec<Secret>,
    /// Adaptors by the responder over the initiator's lock secrets
    initiator_adaptors: Vec<AdaptorSignature>,
    /// Adaptors by the initiator over the responder's lock secrets
    responder_adaptors: Vec<AdaptorSignature>,
    /// Completed signatures published by the responder's claim
    published_signatures: Vec<Signature>,
    extracted_secret: Option<SecretKey>,
    events: Vec<SwapEvent>,
}

impl fmt::Debug for SwapCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapCoordinator")
            .field("state", &self.state)
            .field("initiator_mint", &self.initiator.mint_url)
            .field("responder_mint", &self.responder.mint_url)
            .finish_non_exhaustive()
    }
}

impl SwapCoordinator {
    /// Create a coordinator for the given parties
    pub fn new(initiator: SwapParty, responder: SwapParty, fee: Amount, expiry_time: u64) -> Self {
        Self {
            state: SwapState::Idle,
            initiator,
            responder,
            fee,
            expiry_time,
            adaptor_secret: None,
            adaptor_point: None,
            initiator_secrets: Vec::new(),
            responder_secrets: Vec::new(),
            initiator_adaptors: Vec::new(),
            responder_adaptors: Vec::new(),
            published_signatures: Vec::new(),
            extracted_secret: None,
            events: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SwapState {
        self.state
    }

    /// Events emitted so far
    pub fn events(&self) -> &[SwapEvent] {
        &self.events
    }

    /// Broker fee of the swap
    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Adaptor point `T`, available from `Negotiating` on
    pub fn adaptor_point(&self) -> Option<PublicKey> {
        self.adaptor_point
    }

    /// Secrets the initiator must lock its outputs with, one per
    /// denomination of its amount
    pub fn initiator_lock_secrets(&self) -> &[Secret] {
        &self.initiator_secrets
    }

    /// Secrets the responder must lock its outputs with
    pub fn responder_lock_secrets(&self) -> &[Secret] {
        &self.responder_secrets
    }

    /// Adaptor signatures published by the responder's claim
    pub fn published_signatures(&self) -> &[Signature] {
        &self.published_signatures
    }

    fn ensure_state(&self, expected: SwapState, step: &'static str) -> Result<(), Error> {
        if self.state != expected {
            return Err(Error::InvalidStateTransition {
                from: self.state,
                step,
            });
        }
        Ok(())
    }

    fn ensure_not_expired(&mut self) -> Result<(), Error> {
        if unix_time() > self.expiry_time && self.state.can_cancel() {
            self.state = SwapState::TimedOut;
            self.adaptor_secret = None;
            self.events.push(SwapEvent::TimedOut);
            return Err(Error::SwapExpired);
        }
        Ok(())
    }

    fn fail(&mut self, reason: String) {
        tracing::warn!("Swap failed: {}", reason);
        self.state = SwapState::Failed;
        self.adaptor_secret = None;
        self.events.push(SwapEvent::Failed { reason });
    }

    /// Step 1 (responder role): generate the canonical adaptor secret and
    /// point
    #[instrument(skip(self))]
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.ensure_state(SwapState::Idle, "initialize")?;
        self.ensure_not_expired()?;

        let (t, big_t) = schnorr::generate_adaptor_secret();
        self.adaptor_secret = Some(t);
        self.adaptor_point = Some(big_t);

        self.state = SwapState::Negotiating;
        self.events.push(SwapEvent::Created {
            adaptor_point: big_t,
        });

        tracing::debug!("Swap created with adaptor point {}", big_t);

        Ok(())
    }

    /// Step 2: both sides build P2PK lock secrets for each other's public
    /// key, `SIG_INPUTS`, one per denomination
    #[instrument(skip(self))]
    pub fn create_secrets(&mut self) -> Result<(), Error> {
        self.ensure_state(SwapState::Negotiating, "create_secrets")?;
        self.ensure_not_expired()?;

        self.initiator_secrets =
            lock_secrets_for(&self.responder.pubkey, self.initiator.amount)?;
        self.responder_secrets =
            lock_secrets_for(&self.initiator.pubkey, self.responder.amount)?;

        self.state = SwapState::SecretsCreated;
        self.events.push(SwapEvent::SecretsCreated);

        Ok(())
    }

    /// Step 3: each party computes adaptor signatures over the secrets
    /// locked to its own key, all sharing the adaptor secret `t`
    #[instrument(skip(self))]
    pub fn create_adaptor_signatures(&mut self) -> Result<(), Error> {
        self.ensure_state(SwapState::SecretsCreated, "create_adaptor_signatures")?;
        self.ensure_not_expired()?;

        let t = self
            .adaptor_secret
            .clone()
            .ok_or(Error::MissingPrivateKey("adaptor secret"))?;

        let responder_key = self
            .responder
            .secret_key
            .clone()
            .ok_or(Error::MissingPrivateKey("responder"))?;
        let initiator_key = self
            .initiator
            .secret_key
            .clone()
            .ok_or(Error::MissingPrivateKey("initiator"))?;

        self.initiator_adaptors = self
            .initiator_secrets
            .iter()
            .map(|secret| adaptor_sign(&responder_key, &secret.to_bytes(), &t))
            .collect::<Result<Vec<_>, _>>()?;

        self.responder_adaptors = self
            .responder_secrets
            .iter()
            .map(|secret| adaptor_sign(&initiator_key, &secret.to_bytes(), &t))
            .collect::<Result<Vec<_>, _>>()?;

        self.state = SwapState::AdaptorSigsExchanged;
        self.events.push(SwapEvent::AdaptorSignaturesCreated);

        Ok(())
    }

    /// Step 4: verify every adaptor signature against its signer's pubkey
    /// and its secret, and check both sets share one `T`
    ///
    /// On failure the swap moves to `Failed`; no funds are at risk because
    /// nothing has been published to a mint.
    #[instrument(skip(self))]
    pub fn verify_adaptor_signatures(&mut self) -> Result<(), Error> {
        self.ensure_state(SwapState::AdaptorSigsExchanged, "verify_adaptor_signatures")?;
        self.ensure_not_expired()?;

        if let Err(err) = self.check_adaptor_signatures() {
            self.fail(format!("Adaptor verification failed: {err}"));
            return Err(err);
        }

        self.state = SwapState::Verified;
        self.events.push(SwapEvent::AdaptorSignaturesVerified);

        Ok(())
    }

    fn check_adaptor_signatures(&self) -> Result<(), Error> {
        let adaptor_point = self.adaptor_point.ok_or(Error::AdaptorPointMismatch)?;
        let expected_t = adaptor_point.x_only_public_key();

        let initiator_set = self.initiator_secrets.iter().zip(&self.initiator_adaptors);
        let responder_set = self.responder_secrets.iter().zip(&self.responder_adaptors);

        for (signer, secret, adaptor) in initiator_set
            .map(|(secret, adaptor)| (&self.responder.pubkey, secret, adaptor))
            .chain(
                responder_set
                    .map(|(secret, adaptor)| (&self.initiator.pubkey, secret, adaptor)),
            )
        {
            if adaptor.t() != expected_t {
                return Err(Error::AdaptorPointMismatch);
            }

            adaptor_verify(signer, &secret.to_bytes(), adaptor)?;
        }

        Ok(())
    }

    /// Step 5: the responder completes the adaptors for the initiator's
    /// locked proofs with `t` and spends them on the initiator's mint
    ///
    /// The completed signatures become observable to the initiator by
    /// construction once the mint accepts them.
    #[instrument(skip(self, wallet, locked_proofs))]
    pub async fn responder_claim(
        &mut self,
        wallet: &Wallet,
        locked_proofs: Proofs,
    ) -> Result<Proofs, Error> {
        self.ensure_state(SwapState::Verified, "responder_claim")?;
        self.ensure_not_expired()?;

        let t = self
            .adaptor_secret
            .clone()
            .ok_or(Error::MissingPrivateKey("adaptor secret"))?;

        verify_proofs_match(&locked_proofs, &self.initiator_secrets)?;

        let signatures = self
            .initiator_adaptors
            .iter()
            .map(|adaptor| complete_signature(adaptor, &t))
            .collect::<Result<Vec<_>, _>>()?;

        self.state = SwapState::Claiming;

        let claimed = match wallet
            .claim_locked_with_signatures(locked_proofs, signatures.clone())
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                self.fail(format!("Responder claim rejected: {err}"));
                return Err(err.into());
            }
        };

        self.published_signatures = signatures;
        self.events.push(SwapEvent::ResponderClaimed);

        tracing::info!(
            "Responder claimed {} on {}",
            self.initiator.amount,
            self.initiator.mint_url
        );

        Ok(claimed)
    }

    /// Step 6: the initiator recovers `t` from a published completed
    /// signature and checks `tG == T`
    ///
    /// A failure here indicates a protocol violation (or a mint-verifier
    /// nonce reuse) and fails the swap loudly.
    #[instrument(skip(self, signature))]
    pub fn extract_secret(&mut self, signature: &Signature) -> Result<(), Error> {
        self.ensure_state(SwapState::Claiming, "extract_secret")?;

        let adaptor = self
            .initiator_adaptors
            .iter()
            .find(|adaptor| adaptor.r() == signature.r())
            .ok_or(Error::SecretsMismatch)?;

        let t = match extract_secret(adaptor, signature) {
            Ok(t) => t,
            Err(err) => {
                self.fail(format!("Secret extraction failed: {err}"));
                return Err(err.into());
            }
        };

        self.extracted_secret = Some(t);
        self.state = SwapState::Extracting;
        self.events.push(SwapEvent::SecretExtracted);

        Ok(())
    }

    /// Step 7: the initiator completes the responder's adaptors with the
    /// extracted `t` and spends the responder's locked proofs on the
    /// responder's mint
    #[instrument(skip(self, wallet, locked_proofs))]
    pub async fn initiator_claim(
        &mut self,
        wallet: &Wallet,
        locked_proofs: Proofs,
    ) -> Result<Proofs, Error> {
        self.ensure_state(SwapState::Extracting, "initiator_claim")?;

        let t = self
            .extracted_secret
            .clone()
            .ok_or(Error::MissingPrivateKey("extracted secret"))?;

        verify_proofs_match(&locked_proofs, &self.responder_secrets)?;

        let signatures = self
            .responder_adaptors
            .iter()
            .map(|adaptor| complete_signature(adaptor, &t))
            .collect::<Result<Vec<_>, _>>()?;

        let claimed = match wallet
            .claim_locked_with_signatures(locked_proofs, signatures)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                // The atomicity invariant: after the responder's claim this
                // must always succeed; surface loudly.
                tracing::error!("Initiator claim rejected after responder claim: {err}");
                self.fail(format!("Initiator claim rejected: {err}"));
                return Err(err.into());
            }
        };

        self.state = SwapState::Completed;
        self.adaptor_secret = None;
        self.extracted_secret = None;
        self.events.push(SwapEvent::InitiatorClaimed);

        tracing::info!(
            "Initiator claimed {} on {}",
            self.responder.amount,
            self.responder.mint_url
        );

        Ok(claimed)
    }

    /// Abandon the swap; only possible before `Claiming`
    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> Result<(), Error> {
        if !self.state.can_cancel() {
            return Err(Error::CannotCancel);
        }

        self.state = SwapState::Cancelled;
        self.adaptor_secret = None;
        self.events.push(SwapEvent::Cancelled);

        Ok(())
    }
}

/// Build one P2PK `SIG_INPUTS` lock secret per denomination of `amount`,
/// locked to `recipient`
fn lock_secrets_for(recipient: &PublicKey, amount: Amount) -> Result<Vec<Secret>, Error> {
    amount
        .split()
        .into_iter()
        .map(|_| {
            let conditions = SpendingConditions::new_p2pk(
                *recipient,
                Some(Conditions::new(
                    None,
                    None,
                    None,
                    None,
                    Some(SigFlag::SigInputs),
                )),
            );
            let nut10: Nut10Secret = conditions.into();
            Ok(nut10.try_into()?)
        })
        .collect()
}

/// Check that `proofs` carry exactly the recorded lock secrets, in order
fn verify_proofs_match(proofs: &Proofs, secrets: &[Secret]) -> Result<(), Error> {
    if proofs.len() != secrets.len() {
        return Err(Error::SecretsMismatch);
    }

    for (proof, secret) in proofs.iter().zip(secrets) {
        if &proof.secret != secret {
            return Err(Error::SecretsMismatch);
        }
    }

    Ok(())
}
