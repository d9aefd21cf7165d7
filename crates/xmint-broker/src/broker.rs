//! Broker service
//!
//! Serves quote-based cross-mint swaps against its own liquidity. This is
//! the broker-knows-t mode: the adaptor secret is generated per quote and
//! revealed to the client at acceptance, so the broker is guaranteed to be
//! paid on the source mint iff the client was paid on the target mint.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;
use xmint::mint_url::MintUrl;
use xmint::nuts::nut11::Conditions;
use xmint::nuts::{
    Kind, Nut10Secret, Proofs, ProofsMethods, PublicKey, SecretKey, SigFlag, SpendingConditions,
};
use xmint::schnorr::generate_adaptor_secret;
use xmint::util::unix_time;
use xmint::Amount;
use xmint_wallet::Wallet;

use crate::error::Error;
use crate::ledger::LiquidityLedger;
use crate::quote::{QuoteStatus, SwapQuote};

/// Broker limits and fee policy
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Fee rate applied to the input amount; `fee = ceil(amount * rate)`
    pub fee_rate: f64,
    /// Smallest quotable amount
    pub min_amount: Amount,
    /// Largest quotable amount
    pub max_amount: Amount,
    /// How long an issued quote stays usable
    pub quote_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            fee_rate: 0.005,
            min_amount: Amount::ONE,
            max_amount: Amount::from(1_000_000),
            quote_ttl: Duration::from_secs(300),
        }
    }
}

/// Private per-quote state; never leaves the broker except through the
/// reveal at acceptance
#[derive(Debug)]
struct QuoteSecrets {
    session_key: SecretKey,
    adaptor_secret: SecretKey,
    locked_target_proofs: Proofs,
    source_proofs: Proofs,
}

#[derive(Debug)]
struct BrokerQuote {
    quote: SwapQuote,
    secrets: Option<QuoteSecrets>,
}

/// Result of accepting a quote
#[derive(Debug)]
pub struct AcceptedQuote {
    /// Quote id
    pub quote_id: Uuid,
    /// Target-mint proofs locked to `client_pubkey + T`
    pub proofs: Proofs,
    /// The adaptor secret `t`; with it the client signs for the tweaked
    /// key `client_key + t`
    pub adaptor_secret: SecretKey,
}

/// Multi-mint swap broker
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    wallets: HashMap<MintUrl, Wallet>,
    ledger: LiquidityLedger,
    quotes: RwLock<HashMap<Uuid, BrokerQuote>>,
}

impl Broker {
    /// Create a broker with no mints registered
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            wallets: HashMap::new(),
            ledger: LiquidityLedger::new(),
            quotes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a wallet for a mint the broker serves
    pub fn add_mint(&mut self, wallet: Wallet) {
        self.wallets.insert(wallet.mint_url().clone(), wallet);
    }

    /// Wallet for `mint_url`
    pub fn wallet(&self, mint_url: &MintUrl) -> Result<&Wallet, Error> {
        self.wallets
            .get(mint_url)
            .ok_or_else(|| Error::UnsupportedMint(mint_url.clone()))
    }

    /// The broker's liquidity ledger
    pub fn ledger(&self) -> &LiquidityLedger {
        &self.ledger
    }

    /// Add proofs to the broker's inventory on `mint_url`
    pub async fn deposit(&self, mint_url: &MintUrl, proofs: Proofs) -> Result<Amount, Error> {
        self.wallet(mint_url)?;
        self.ledger.add(mint_url, proofs, None).await
    }

    /// Issue a quote for swapping `amount` from `source_mint` to
    /// `target_mint`
    #[instrument(skip(self))]
    pub async fn request_quote(
        &self,
        source_mint: &MintUrl,
        target_mint: &MintUrl,
        amount: Amount,
    ) -> Result<SwapQuote, Error> {
        if source_mint == target_mint {
            return Err(Error::SameMint);
        }
        self.wallet(source_mint)?;
        self.wallet(target_mint)?;

        if amount < self.config.min_amount || amount > self.config.max_amount {
            return Err(Error::AmountOutOfLimits(
                self.config.min_amount,
                self.config.max_amount,
                amount,
            ));
        }

        let fee = Amount::from((u64::from(amount) as f64 * self.config.fee_rate).ceil() as u64);
        let output_amount = amount
            .checked_sub(fee)
            .filter(|output| *output > Amount::ZERO)
            .ok_or(Error::AmountOutOfLimits(
                self.config.min_amount,
                self.config.max_amount,
                amount,
            ))?;

        if !self.ledger.can_serve(target_mint, output_amount).await {
            let available = self
                .ledger
                .balance(target_mint)
                .await
                .unwrap_or(Amount::ZERO);
            return Err(Error::InsufficientLiquidity {
                mint_url: target_mint.clone(),
                requested: output_amount,
                available,
            });
        }

        let session_key = SecretKey::generate();
        let (adaptor_secret, adaptor_point) = generate_adaptor_secret();

        let now = unix_time();
        let quote = SwapQuote {
            id: Uuid::new_v4(),
            source_mint: source_mint.clone(),
            target_mint: target_mint.clone(),
            input_amount: amount,
            output_amount,
            fee,
            fee_rate: self.config.fee_rate,
            broker_session_pubkey: session_key.public_key(),
            adaptor_point,
            created_at: now,
            expires_at: now + self.config.quote_ttl.as_secs(),
            completed_at: None,
            status: QuoteStatus::Pending,
        };

        tracing::info!(
            "Quote {}: {} on {} -> {} on {} (fee {})",
            quote.id,
            amount,
            source_mint,
            output_amount,
            target_mint,
            fee
        );

        self.quotes.write().await.insert(
            quote.id,
            BrokerQuote {
                quote: quote.clone(),
                secrets: Some(QuoteSecrets {
                    session_key,
                    adaptor_secret,
                    locked_target_proofs: Proofs::new(),
                    source_proofs: Proofs::new(),
                }),
            },
        );

        Ok(quote)
    }

    /// Accept a quote: lock target-mint tokens to `client_pubkey + T` and
    /// hand them out together with the adaptor secret
    #[instrument(skip(self, client_pubkey))]
    pub async fn accept_quote(
        &self,
        quote_id: Uuid,
        client_pubkey: PublicKey,
    ) -> Result<AcceptedQuote, Error> {
        // Claim the quote under the lock so a concurrent accept fails fast
        let (target_mint, output_amount, adaptor_point, adaptor_secret) = {
            let mut quotes = self.quotes.write().await;
            let entry = quotes.get_mut(&quote_id).ok_or(Error::UnknownQuote(quote_id))?;

            if entry.quote.status != QuoteStatus::Pending {
                return Err(Error::InvalidQuoteState {
                    quote_id,
                    status: entry.quote.status,
                });
            }

            if entry.quote.is_expired(unix_time()) {
                entry.quote.status = QuoteStatus::Expired;
                entry.secrets = None;
                return Err(Error::QuoteExpired(quote_id));
            }

            entry.quote.status = QuoteStatus::Accepted;

            let secrets = entry
                .secrets
                .as_ref()
                .ok_or(Error::UnknownQuote(quote_id))?;

            (
                entry.quote.target_mint.clone(),
                entry.quote.output_amount,
                entry.quote.adaptor_point,
                secrets.adaptor_secret.clone(),
            )
        };

        let result = self
            .lock_target_liquidity(quote_id, &target_mint, output_amount, client_pubkey, adaptor_point)
            .await;

        let mut quotes = self.quotes.write().await;
        let entry = quotes.get_mut(&quote_id).ok_or(Error::UnknownQuote(quote_id))?;

        match result {
            Ok(locked) => {
                if let Some(secrets) = entry.secrets.as_mut() {
                    secrets.locked_target_proofs = locked.clone();
                }

                tracing::info!("Quote {} accepted; {} locked on {}", quote_id, output_amount, target_mint);

                Ok(AcceptedQuote {
                    quote_id,
                    proofs: locked,
                    adaptor_secret,
                })
            }
            Err(err) => {
                entry.quote.status = QuoteStatus::Failed;
                entry.secrets = None;
                Err(err)
            }
        }
    }

    /// Remove inventory and relock it to the client's tweaked key
    async fn lock_target_liquidity(
        &self,
        quote_id: Uuid,
        target_mint: &MintUrl,
        output_amount: Amount,
        client_pubkey: PublicKey,
        adaptor_point: PublicKey,
    ) -> Result<Proofs, Error> {
        let wallet = self.wallet(target_mint)?;

        // Effective lock key `client + T`; a signature by `client_key + t`
        // authorises spending
        let tweaked = client_pubkey.combine(&adaptor_point)?;
        let conditions = SpendingConditions::new_p2pk(
            tweaked,
            Some(Conditions::new(None, None, None, None, Some(SigFlag::SigInputs))),
        );

        let selected = self
            .ledger
            .select(target_mint, output_amount, Some(quote_id))
            .await?;

        match wallet
            .swap_for_locked(selected.clone(), output_amount, &conditions)
            .await
        {
            Ok((locked, change)) => {
                self.ledger
                    .add(target_mint, change, Some(quote_id))
                    .await?;
                Ok(locked)
            }
            Err(err) => {
                // The swap did not go through; the inputs are still ours
                self.ledger
                    .add(target_mint, selected, Some(quote_id))
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Complete a swap: claim the client's source-mint tokens with the
    /// tweaked session key and bank them
    ///
    /// Idempotent; a second call after success has no further on-ledger
    /// effect.
    #[instrument(skip(self, client_proofs))]
    pub async fn complete_swap(
        &self,
        quote_id: Uuid,
        client_proofs: Proofs,
    ) -> Result<(), Error> {
        let (source_mint, input_amount, signing_key, session_pubkey, adaptor_point) = {
            let quotes = self.quotes.read().await;
            let entry = quotes.get(&quote_id).ok_or(Error::UnknownQuote(quote_id))?;

            match entry.quote.status {
                QuoteStatus::Completed => return Ok(()),
                QuoteStatus::Accepted => {}
                status => {
                    return Err(Error::InvalidQuoteState { quote_id, status });
                }
            }

            let secrets = entry
                .secrets
                .as_ref()
                .ok_or(Error::UnknownQuote(quote_id))?;

            // Spending key for outputs locked to `session_pubkey + T`
            let signing_key = secrets.session_key.add_tweak(&secrets.adaptor_secret)?;

            (
                entry.quote.source_mint.clone(),
                entry.quote.input_amount,
                signing_key,
                entry.quote.broker_session_pubkey,
                entry.quote.adaptor_point,
            )
        };

        let provided = client_proofs.total_amount()?;
        if provided != input_amount {
            return Err(Error::UnbalancedQuote(provided, input_amount));
        }

        let expected_lock = session_pubkey.combine(&adaptor_point)?;
        verify_locked_to(&client_proofs, &expected_lock)?;

        let wallet = self.wallet(&source_mint)?;

        let claimed = match wallet.claim_locked(client_proofs, &signing_key).await {
            Ok(claimed) => claimed,
            Err(err) => {
                if !err.is_retryable() {
                    let mut quotes = self.quotes.write().await;
                    if let Some(entry) = quotes.get_mut(&quote_id) {
                        // Never clobber a completion that raced us
                        if entry.quote.status == QuoteStatus::Accepted {
                            entry.quote.status = QuoteStatus::Failed;
                            entry.secrets = None;
                        }
                        if entry.quote.status == QuoteStatus::Completed {
                            return Ok(());
                        }
                    }
                }
                return Err(err.into());
            }
        };

        self.ledger
            .add(&source_mint, claimed.clone(), Some(quote_id))
            .await?;

        let mut quotes = self.quotes.write().await;
        if let Some(entry) = quotes.get_mut(&quote_id) {
            if let Some(secrets) = entry.secrets.as_mut() {
                secrets.source_proofs = claimed;
            }
            entry.quote.status = QuoteStatus::Completed;
            entry.quote.completed_at = Some(unix_time());
            // The swap is settled; destroy the per-quote key material
            entry.secrets = None;
        }

        tracing::info!("Quote {} completed; +{} on {}", quote_id, input_amount, source_mint);

        Ok(())
    }

    /// Sweep quotes whose TTL has lapsed into `Expired`
    #[instrument(skip(self))]
    pub async fn expire_stale_quotes(&self) -> usize {
        let now = unix_time();
        let mut expired = 0;

        let mut quotes = self.quotes.write().await;
        for entry in quotes.values_mut() {
            if matches!(
                entry.quote.status,
                QuoteStatus::Pending | QuoteStatus::Accepted
            ) && entry.quote.is_expired(now)
            {
                entry.quote.status = QuoteStatus::Expired;
                entry.secrets = None;
                expired += 1;
                tracing::debug!("Quote {} expired", entry.quote.id);
            }
        }

        expired
    }

    /// Public state of a quote
    pub async fn quote(&self, quote_id: Uuid) -> Option<SwapQuote> {
        self.quotes
            .read()
            .await
            .get(&quote_id)
            .map(|entry| entry.quote.clone())
    }

    /// Durable per-swap records, one per quote ever issued
    pub async fn swap_records(&self) -> Vec<SwapQuote> {
        self.quotes
            .read()
            .await
            .values()
            .map(|entry| entry.quote.clone())
            .collect()
    }
}

/// Check every proof is locked to `expected` before sending it anywhere
fn verify_locked_to(proofs: &Proofs, expected: &PublicKey) -> Result<(), Error> {
    for proof in proofs {
        let secret = Nut10Secret::try_from(&proof.secret).map_err(|_| Error::SecretsMismatch)?;

        if secret.kind() != Kind::P2PK || secret.secret_data().data() != expected.to_hex() {
            return Err(Error::SecretsMismatch);
        }
    }

    Ok(())
}
