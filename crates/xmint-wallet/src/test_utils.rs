//! In-memory mint backend for tests
//!
//! Implements [`MintConnector`] directly with no HTTP in between: bolt11
//! quotes are paid instantly, outputs are signed with a per-denomination
//! keyset and the swap endpoint enforces balance, double-spend rejection
//! and P2PK witnesses.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use xmint::dhke::sign_message;
use xmint::nuts::nut11::{enforce_sig_flag, sig_all_message, valid_signatures, SigFlag};
use xmint::nuts::{
    BlindSignature, BlindedMessage, CheckStateRequest, CheckStateResponse, CurrencyUnit, KeySet,
    KeySetInfo, KeysetResponse, MeltQuoteBolt11Request, MeltQuoteBolt11Response, MintInfo,
    MintKeySet, MintQuoteBolt11Request, MintQuoteBolt11Response, MintRequest, MintResponse,
    MintVersion, ProofState, Proofs, ProofsMethods, PublicKey, State, SupportedSettings,
    SwapRequest, SwapResponse,
};
use xmint::schnorr::Signature;
use xmint::secret::Secret;
use xmint::Amount;

use crate::client::MintConnector;
use crate::error::Error;

const MAX_ORDER: u8 = 32;

#[derive(Debug, Clone)]
struct MintQuote {
    amount: Amount,
    paid: bool,
    issued: bool,
}

#[derive(Debug, Default)]
struct MintState {
    quotes: HashMap<String, MintQuote>,
    spent: HashSet<PublicKey>,
}

/// In-memory mint
#[derive(Debug)]
pub struct InMemoryMint {
    keyset: MintKeySet,
    state: Mutex<MintState>,
}

impl Default for InMemoryMint {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMint {
    /// Create a new mint with a random sat keyset
    pub fn new() -> Self {
        Self {
            keyset: MintKeySet::generate(CurrencyUnit::Sat, MAX_ORDER),
            state: Mutex::new(MintState::default()),
        }
    }

    fn sign_outputs(&self, outputs: &[BlindedMessage]) -> Result<Vec<BlindSignature>, Error> {
        outputs
            .iter()
            .map(|output| {
                let keypair = self
                    .keyset
                    .keys
                    .get(&output.amount)
                    .ok_or(Error::AmountKey)?;

                let c = sign_message(&keypair.secret_key, &output.blinded_secret)?;

                Ok(BlindSignature {
                    amount: output.amount,
                    keyset_id: self.keyset.id,
                    c,
                })
            })
            .collect()
    }

    fn verify_spending_conditions(&self, inputs: &Proofs) -> Result<(), Error> {
        let enforced = enforce_sig_flag(inputs);

        match enforced.sig_flag {
            SigFlag::SigAll => {
                let msg = sig_all_message(inputs);

                let witness = inputs
                    .first()
                    .and_then(|proof| proof.witness.as_ref())
                    .and_then(|witness| witness.signatures())
                    .ok_or(Error::WitnessMissingOrInvalid)?;

                let signatures = witness
                    .iter()
                    .map(|s| Signature::from_str(s))
                    .collect::<Result<Vec<Signature>, _>>()
                    .map_err(|_| Error::WitnessMissingOrInvalid)?;

                let pubkeys: Vec<PublicKey> = enforced.pubkeys.into_iter().collect();
                let valid = valid_signatures(&msg, &pubkeys, &signatures)
                    .map_err(|e| Error::P2PKConditionsNotMet(e.to_string()))?;

                if valid < enforced.sigs_required {
                    return Err(Error::P2PKConditionsNotMet(
                        "Not enough valid signatures".to_string(),
                    ));
                }
            }
            SigFlag::SigInputs => {
                for proof in inputs {
                    if proof.secret.is_nut10() {
                        proof
                            .verify_p2pk()
                            .map_err(|e| Error::P2PKConditionsNotMet(e.to_string()))?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MintConnector for InMemoryMint {
    async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        let mut info = MintInfo {
            name: Some("in-memory mint".to_string()),
            version: Some(MintVersion {
                name: "xmint-test".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            ..Default::default()
        };

        info.nuts.nut07 = SupportedSettings { supported: true };
        info.nuts.nut10 = SupportedSettings { supported: true };
        info.nuts.nut11 = SupportedSettings { supported: true };

        Ok(info)
    }

    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error> {
        Ok(vec![KeySet::from(self.keyset.clone())])
    }

    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error> {
        Ok(KeysetResponse {
            keysets: vec![KeySetInfo {
                id: self.keyset.id,
                unit: self.keyset.unit,
                active: true,
                input_fee_ppk: 0,
            }],
        })
    }

    async fn post_mint_quote(
        &self,
        request: MintQuoteBolt11Request,
    ) -> Result<MintQuoteBolt11Response, Error> {
        let quote_id = Secret::generate().to_string();

        let mut state = self.state.lock().await;
        state.quotes.insert(
            quote_id.clone(),
            MintQuote {
                amount: request.amount,
                // Quotes are instantly paid
                paid: true,
                issued: false,
            },
        );

        Ok(MintQuoteBolt11Response {
            quote: quote_id,
            request: "lnbcfake".to_string(),
            paid: true,
            expiry: None,
        })
    }

    async fn get_mint_quote_status(
        &self,
        quote_id: &str,
    ) -> Result<MintQuoteBolt11Response, Error> {
        let state = self.state.lock().await;
        let quote = state.quotes.get(quote_id).ok_or(Error::UnknownQuote)?;

        Ok(MintQuoteBolt11Response {
            quote: quote_id.to_string(),
            request: "lnbcfake".to_string(),
            paid: quote.paid,
            expiry: None,
        })
    }

    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error> {
        let mut state = self.state.lock().await;

        let quote = state
            .quotes
            .get_mut(&request.quote)
            .ok_or(Error::UnknownQuote)?;

        if !quote.paid {
            return Err(Error::UnpaidQuote);
        }
        if quote.issued {
            return Err(Error::IssuedQuote);
        }

        let requested = request.total_amount()?;
        if requested != quote.amount {
            return Err(Error::TransactionUnbalanced(
                quote.amount.into(),
                requested.into(),
            ));
        }

        quote.issued = true;
        drop(state);

        let signatures = self.sign_outputs(&request.outputs)?;

        Ok(MintResponse { signatures })
    }

    async fn post_melt_quote(
        &self,
        _request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        Ok(MeltQuoteBolt11Response {
            quote: Secret::generate().to_string(),
            amount: Amount::ZERO,
            fee_reserve: Amount::ZERO,
            paid: false,
            expiry: None,
        })
    }

    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        let input_amount = request.input_amount().map_err(|_| {
            Error::Custom("Input amount overflow".to_string())
        })?;
        let output_amount = request.output_amount().map_err(|_| {
            Error::Custom("Output amount overflow".to_string())
        })?;

        if input_amount != output_amount {
            return Err(Error::TransactionUnbalanced(
                input_amount.into(),
                output_amount.into(),
            ));
        }

        let ys = request.inputs.ys()?;

        let mut unique = HashSet::new();
        if !ys.iter().all(|y| unique.insert(*y)) {
            return Err(Error::DuplicateProofs);
        }

        self.verify_spending_conditions(&request.inputs)?;

        let mut state = self.state.lock().await;

        if ys.iter().any(|y| state.spent.contains(y)) {
            return Err(Error::TokenAlreadySpent);
        }

        let signatures = self.sign_outputs(&request.outputs)?;

        state.spent.extend(ys);

        Ok(SwapResponse { signatures })
    }

    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        let state = self.state.lock().await;

        let states = request
            .ys
            .into_iter()
            .map(|y| ProofState {
                y,
                state: if state.spent.contains(&y) {
                    State::Spent
                } else {
                    State::Unspent
                },
                witness: None,
            })
            .collect();

        Ok(CheckStateResponse { states })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    use xmint::mint_url::MintUrl;
    use xmint::nuts::{PreMintSecrets, SecretKey, SpendingConditions};

    use super::*;
    use crate::wallet::Wallet;

    fn test_wallet(mint: Arc<InMemoryMint>) -> Wallet {
        Wallet::new(
            MintUrl::from_str("http://localhost:3338").expect("valid url"),
            CurrencyUnit::Sat,
            mint,
        )
    }

    async fn mint_proofs(wallet: &Wallet, amount: Amount) -> Proofs {
        let quote = wallet.mint_quote(amount).await.expect("quote");
        wallet
            .wait_for_paid(&quote.quote, Duration::from_secs(1))
            .await
            .expect("paid");
        wallet.mint(&quote.quote, amount, None).await.expect("mint")
    }

    #[tokio::test]
    async fn test_mint_and_check_state() {
        let wallet = test_wallet(Arc::new(InMemoryMint::new()));

        let proofs = mint_proofs(&wallet, Amount::from(11)).await;
        assert_eq!(proofs.total_amount().unwrap(), Amount::from(11));
        assert_eq!(proofs.len(), 3);

        let states = wallet.check_proofs_spent(&proofs).await.unwrap();
        assert!(states.iter().all(|s| s.state == State::Unspent));
    }

    #[tokio::test]
    async fn test_double_spend_is_rejected() {
        let mint = Arc::new(InMemoryMint::new());
        let wallet = test_wallet(Arc::clone(&mint));

        let proofs = mint_proofs(&wallet, Amount::from(4)).await;

        let keyset = wallet.active_keyset().await.unwrap();
        let premint = PreMintSecrets::random(keyset.id, Amount::from(4)).unwrap();
        let request = SwapRequest::new(proofs.clone(), premint.blinded_messages());
        mint.post_swap(request).await.unwrap();

        let premint = PreMintSecrets::random(keyset.id, Amount::from(4)).unwrap();
        let request = SwapRequest::new(proofs, premint.blinded_messages());
        assert!(matches!(
            mint.post_swap(request).await,
            Err(Error::TokenAlreadySpent)
        ));
    }

    #[tokio::test]
    async fn test_unbalanced_swap_is_rejected() {
        let mint = Arc::new(InMemoryMint::new());
        let wallet = test_wallet(Arc::clone(&mint));

        let proofs = mint_proofs(&wallet, Amount::from(4)).await;

        let keyset = wallet.active_keyset().await.unwrap();
        let premint = PreMintSecrets::random(keyset.id, Amount::from(8)).unwrap();
        let request = SwapRequest::new(proofs, premint.blinded_messages());

        assert!(matches!(
            mint.post_swap(request).await,
            Err(Error::TransactionUnbalanced(4, 8))
        ));
    }

    #[tokio::test]
    async fn test_locked_proofs_need_witness() {
        let mint = Arc::new(InMemoryMint::new());
        let wallet = test_wallet(Arc::clone(&mint));

        let recipient = SecretKey::generate();
        let conditions = SpendingConditions::new_p2pk(recipient.public_key(), None);

        let proofs = mint_proofs(&wallet, Amount::from(8)).await;
        let (locked, change) = wallet
            .swap_for_locked(proofs, Amount::from(8), &conditions)
            .await
            .unwrap();
        assert!(change.is_empty());

        // Spending without a witness fails
        let keyset = wallet.active_keyset().await.unwrap();
        let premint = PreMintSecrets::random(keyset.id, Amount::from(8)).unwrap();
        let request = SwapRequest::new(locked.clone(), premint.blinded_messages());
        assert!(mint.post_swap(request).await.is_err());

        // Claiming with the recipient key succeeds
        let claimed = wallet.claim_locked(locked, &recipient).await.unwrap();
        assert_eq!(claimed.total_amount().unwrap(), Amount::from(8));
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_claim() {
        let mint = Arc::new(InMemoryMint::new());
        let wallet = test_wallet(Arc::clone(&mint));

        let recipient = SecretKey::generate();
        let intruder = SecretKey::generate();
        let conditions = SpendingConditions::new_p2pk(recipient.public_key(), None);

        let proofs = mint_proofs(&wallet, Amount::from(8)).await;
        let (locked, _change) = wallet
            .swap_for_locked(proofs, Amount::from(8), &conditions)
            .await
            .unwrap();

        assert!(wallet.claim_locked(locked, &intruder).await.is_err());
    }
}
