//! Token engine
//!
//! Minting, relocking and claiming of bearer tokens on a single mint.
//! Requested amounts are always split into power-of-two denominations; the
//! order of blinded outputs is preserved through the mint round trip so
//! blinding factors, secrets and signatures line up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::instrument;
use xmint::dhke::construct_proofs;
use xmint::mint_url::MintUrl;
use xmint::nuts::nut11::{enforce_sig_flag, sig_all_message};
use xmint::nuts::{
    CheckStateRequest, CurrencyUnit, KeySet, MintInfo, MintQuoteBolt11Request,
    MintQuoteBolt11Response, MintRequest, PreMintSecrets, ProofState, Proofs, ProofsMethods,
    SecretKey, SigFlag, SpendingConditions, SwapRequest,
};
use xmint::schnorr::Signature;
use xmint::Amount;

use crate::client::MintConnector;
use crate::error::Error;

const PAID_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Wallet for a single mint
#[derive(Debug, Clone)]
pub struct Wallet {
    /// Mint url
    mint_url: MintUrl,
    /// Currency unit of the wallet
    unit: CurrencyUnit,
    client: Arc<dyn MintConnector>,
    active_keyset: Arc<RwLock<Option<KeySet>>>,
}

impl Wallet {
    /// Create new [`Wallet`]
    pub fn new(mint_url: MintUrl, unit: CurrencyUnit, client: Arc<dyn MintConnector>) -> Self {
        Self {
            mint_url,
            unit,
            client,
            active_keyset: Arc::new(RwLock::new(None)),
        }
    }

    /// Mint url of the wallet
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }

    /// Currency unit of the wallet
    pub fn unit(&self) -> CurrencyUnit {
        self.unit
    }

    /// Mint info
    pub async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        self.client.get_mint_info().await
    }

    /// Active keyset of the mint for the wallet unit
    ///
    /// The keyset the mint declares active is used; with no active
    /// declaration the first keyset for the unit is taken. The result is
    /// cached.
    #[instrument(skip(self))]
    pub async fn active_keyset(&self) -> Result<KeySet, Error> {
        if let Some(keyset) = self.active_keyset.read().await.clone() {
            return Ok(keyset);
        }

        let keyset_infos = self.client.get_mint_keysets().await?.keysets;

        let keyset_id = keyset_infos
            .iter()
            .filter(|info| info.unit == self.unit)
            .find(|info| info.active)
            .or_else(|| keyset_infos.iter().find(|info| info.unit == self.unit))
            .map(|info| info.id)
            .ok_or(Error::UnknownKeySet)?;

        let keyset = self
            .client
            .get_mint_keys()
            .await?
            .into_iter()
            .find(|keyset| keyset.id == keyset_id)
            .ok_or(Error::UnknownKeySet)?;

        *self.active_keyset.write().await = Some(keyset.clone());

        Ok(keyset)
    }

    /// Drop the cached keyset so the next call refetches it
    pub async fn refresh_keysets(&self) {
        *self.active_keyset.write().await = None;
    }

    /// Request a mint quote for `amount`
    #[instrument(skip(self))]
    pub async fn mint_quote(&self, amount: Amount) -> Result<MintQuoteBolt11Response, Error> {
        let request = MintQuoteBolt11Request {
            amount,
            unit: self.unit,
            description: None,
        };

        self.client.post_mint_quote(request).await
    }

    /// Wait until the mint reports the quote as paid
    ///
    /// Test backends pay instantly; production backends are polled up to
    /// `timeout`.
    #[instrument(skip(self))]
    pub async fn wait_for_paid(&self, quote_id: &str, timeout: Duration) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let status = self.client.get_mint_quote_status(quote_id).await?;
            if status.paid {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::PaymentTimeout);
            }

            tokio::time::sleep(PAID_POLL_INTERVAL).await;
        }
    }

    /// Mint tokens for a paid quote
    ///
    /// With `conditions` the minted proofs are P2PK locked; without, they
    /// are anyone-can-spend. Returned proofs sum exactly to `amount`.
    #[instrument(skip(self, conditions))]
    pub async fn mint(
        &self,
        quote_id: &str,
        amount: Amount,
        conditions: Option<&SpendingConditions>,
    ) -> Result<Proofs, Error> {
        let keyset = self.active_keyset().await?;

        let premint = match conditions {
            Some(conditions) => {
                PreMintSecrets::with_conditions(keyset.id, amount, conditions)?
            }
            None => PreMintSecrets::random(keyset.id, amount)?,
        };

        self.mint_premint(quote_id, premint).await
    }

    /// Mint tokens for a paid quote from already-built premint secrets
    ///
    /// Used when the output secrets were agreed upon out of band, e.g.
    /// locked swap outputs.
    #[instrument(skip(self, premint))]
    pub async fn mint_premint(
        &self,
        quote_id: &str,
        premint: PreMintSecrets,
    ) -> Result<Proofs, Error> {
        let keyset = self.active_keyset().await?;

        let amount = premint.total_amount()?;

        let request = MintRequest {
            quote: quote_id.to_string(),
            outputs: premint.blinded_messages(),
        };

        let response = self.client.post_mint(request).await?;

        if response.signatures.len() != premint.secrets.len() {
            return Err(Error::Custom(
                "Mint returned wrong number of signatures".to_string(),
            ));
        }

        let proofs = construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keyset.keys,
        )?;

        debug_assert_eq!(proofs.total_amount()?, amount);

        tracing::debug!(
            "Minted {} for quote {} on {}",
            amount,
            quote_id,
            self.mint_url
        );

        Ok(proofs)
    }

    /// Swap `inputs` for the outputs of `premint`
    async fn swap(&self, inputs: Proofs, premint: PreMintSecrets) -> Result<Proofs, Error> {
        let keyset = self.active_keyset().await?;

        let request = SwapRequest::new(inputs, premint.blinded_messages());
        let response = self.client.post_swap(request).await?;

        if response.signatures.len() != premint.secrets.len() {
            return Err(Error::Custom(
                "Mint returned wrong number of signatures".to_string(),
            ));
        }

        Ok(construct_proofs(
            response.signatures,
            premint.rs(),
            premint.secrets(),
            &keyset.keys,
        )?)
    }

    /// Relock `inputs` into `lock_amount` of P2PK-locked proofs plus
    /// anyone-can-spend change
    #[instrument(skip(self, inputs, conditions))]
    pub async fn swap_for_locked(
        &self,
        inputs: Proofs,
        lock_amount: Amount,
        conditions: &SpendingConditions,
    ) -> Result<(Proofs, Proofs), Error> {
        let keyset = self.active_keyset().await?;

        let total = inputs.total_amount()?;
        let change_amount = total
            .checked_sub(lock_amount)
            .ok_or(Error::InsufficientFunds)?;

        let mut premint = PreMintSecrets::with_conditions(keyset.id, lock_amount, conditions)?;
        let locked_count = premint.secrets.len();

        let change_premint = PreMintSecrets::random(keyset.id, change_amount)?;
        premint.secrets.extend(change_premint.secrets);

        let mut proofs = self.swap(inputs, premint).await?;

        let change = proofs.split_off(locked_count);

        debug_assert_eq!(proofs.total_amount()?, lock_amount);

        Ok((proofs, change))
    }

    /// Spend P2PK-locked `inputs` with `signing_key`, swapping them into
    /// fresh anyone-can-spend proofs
    ///
    /// Each input carries its own witness for `SIG_INPUTS`; a single
    /// witness over the joint message rides on the first input for
    /// `SIG_ALL`.
    #[instrument(skip(self, inputs, signing_key))]
    pub async fn claim_locked(
        &self,
        mut inputs: Proofs,
        signing_key: &SecretKey,
    ) -> Result<Proofs, Error> {
        let enforced = enforce_sig_flag(&inputs);

        match enforced.sig_flag {
            SigFlag::SigAll => {
                let msg = sig_all_message(&inputs);
                let signature = signing_key.sign(&msg)?;
                let first = inputs.first_mut().ok_or(Error::InsufficientFunds)?;
                first.add_witness_signature(signature);
            }
            SigFlag::SigInputs => {
                for proof in inputs.iter_mut() {
                    proof.sign_p2pk(signing_key.clone())?;
                }
            }
        }

        self.claim_witnessed(inputs).await
    }

    /// Spend P2PK-locked `inputs` using pre-computed witness signatures,
    /// one per input in input order
    #[instrument(skip(self, inputs, signatures))]
    pub async fn claim_locked_with_signatures(
        &self,
        mut inputs: Proofs,
        signatures: Vec<Signature>,
    ) -> Result<Proofs, Error> {
        if signatures.len() != inputs.len() {
            return Err(Error::WitnessMissingOrInvalid);
        }

        for (proof, signature) in inputs.iter_mut().zip(signatures) {
            proof.add_witness_signature(signature);
        }

        self.claim_witnessed(inputs).await
    }

    /// Swap witness-bearing inputs into fresh anyone-can-spend proofs
    async fn claim_witnessed(&self, inputs: Proofs) -> Result<Proofs, Error> {
        let keyset = self.active_keyset().await?;

        let total = inputs.total_amount()?;
        let premint = PreMintSecrets::random(keyset.id, total)?;

        let proofs = self.swap(inputs, premint).await?;

        debug_assert_eq!(proofs.total_amount()?, total);

        Ok(proofs)
    }

    /// Check which of `proofs` the mint considers spent
    #[instrument(skip(self, proofs))]
    pub async fn check_proofs_spent(&self, proofs: &Proofs) -> Result<Vec<ProofState>, Error> {
        let request = CheckStateRequest { ys: proofs.ys()? };
        let response = self.client.post_check_state(request).await?;
        Ok(response.states)
    }
}
