//! Liquidity ledger
//!
//! Per-mint balance and proof inventory. The invariant `balance ==
//! Σ proofs.amount` holds after every mutation; mutations are serialised
//! per ledger through a writer lock while reads may be concurrent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;
use xmint::mint_url::MintUrl;
use xmint::nuts::{Proofs, ProofsMethods};
use xmint::util::unix_time;
use xmint::Amount;

use crate::error::Error;

/// Kind of an inventory change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventKind {
    /// Proofs were added to the inventory
    Added,
    /// Proofs were removed from the inventory
    Removed,
}

/// Record of one inventory change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Mint the change applies to
    pub mint_url: MintUrl,
    /// Kind of change
    pub kind: LedgerEventKind,
    /// Amount added or removed
    pub amount: Amount,
    /// Balance after the change
    pub balance_after: Amount,
    /// Correlated swap quote, when the change belongs to one
    pub quote_id: Option<Uuid>,
    /// Seconds since unix epoch
    pub timestamp: u64,
}

#[derive(Debug, Default)]
struct MintLiquidity {
    balance: Amount,
    proofs: Proofs,
}

#[derive(Debug, Default)]
struct LedgerState {
    mints: HashMap<MintUrl, MintLiquidity>,
    events: Vec<LedgerEvent>,
}

/// Concurrent in-memory liquidity ledger
#[derive(Debug, Default)]
pub struct LiquidityLedger {
    state: RwLock<LedgerState>,
}

impl LiquidityLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Add proofs to the inventory of `mint_url`
    pub async fn add(
        &self,
        mint_url: &MintUrl,
        proofs: Proofs,
        quote_id: Option<Uuid>,
    ) -> Result<Amount, Error> {
        if proofs.is_empty() {
            return Ok(self.balance(mint_url).await.unwrap_or(Amount::ZERO));
        }

        let amount = proofs.total_amount()?;

        let mut state = self.state.write().await;
        let liquidity = state.mints.entry(mint_url.clone()).or_default();

        liquidity.proofs.extend(proofs);
        liquidity.balance += amount;

        let balance_after = liquidity.balance;
        debug_assert_eq!(balance_after, liquidity.proofs.total_amount()?);

        state.events.push(LedgerEvent {
            mint_url: mint_url.clone(),
            kind: LedgerEventKind::Added,
            amount,
            balance_after,
            quote_id,
            timestamp: unix_time(),
        });

        tracing::debug!("Ledger +{} on {} (balance {})", amount, mint_url, balance_after);

        Ok(balance_after)
    }

    /// Remove `proofs` from the inventory of `mint_url` by unique secret
    pub async fn remove(
        &self,
        mint_url: &MintUrl,
        proofs: &Proofs,
        quote_id: Option<Uuid>,
    ) -> Result<Amount, Error> {
        let mut state = self.state.write().await;
        let liquidity = state
            .mints
            .get_mut(mint_url)
            .ok_or_else(|| Error::UnsupportedMint(mint_url.clone()))?;

        let secrets: Vec<_> = proofs.iter().map(|p| &p.secret).collect();

        let mut removed = Amount::ZERO;
        liquidity.proofs.retain(|proof| {
            if secrets.contains(&&proof.secret) {
                removed += proof.amount;
                false
            } else {
                true
            }
        });

        liquidity.balance -= removed;

        let balance_after = liquidity.balance;
        debug_assert_eq!(balance_after, liquidity.proofs.total_amount()?);

        state.events.push(LedgerEvent {
            mint_url: mint_url.clone(),
            kind: LedgerEventKind::Removed,
            amount: removed,
            balance_after,
            quote_id,
            timestamp: unix_time(),
        });

        tracing::debug!("Ledger -{} on {} (balance {})", removed, mint_url, balance_after);

        Ok(balance_after)
    }

    /// Atomically select and remove proofs covering at least `amount`
    ///
    /// Greedy largest-first choice; fails with a structured liquidity
    /// error when the inventory cannot cover the amount. The chosen proofs
    /// may sum to more than `amount`; the caller returns any change.
    pub async fn select(
        &self,
        mint_url: &MintUrl,
        amount: Amount,
        quote_id: Option<Uuid>,
    ) -> Result<Proofs, Error> {
        let mut state = self.state.write().await;
        let liquidity = state
            .mints
            .get_mut(mint_url)
            .ok_or_else(|| Error::UnsupportedMint(mint_url.clone()))?;

        if liquidity.balance < amount {
            return Err(Error::InsufficientLiquidity {
                mint_url: mint_url.clone(),
                requested: amount,
                available: liquidity.balance,
            });
        }

        // Ascending, so pop() hands out the largest proof first
        liquidity.proofs.sort_by(|a, b| a.amount.cmp(&b.amount));

        let mut selected = Proofs::new();
        let mut selected_amount = Amount::ZERO;

        while selected_amount < amount {
            // Balance covers the amount, so there is always a next proof
            let proof = match liquidity.proofs.pop() {
                Some(proof) => proof,
                None => break,
            };
            selected_amount += proof.amount;
            selected.push(proof);
        }

        if selected_amount < amount {
            // Inventory disagreed with the balance; put everything back
            liquidity.proofs.extend(selected);
            return Err(Error::InsufficientLiquidity {
                mint_url: mint_url.clone(),
                requested: amount,
                available: liquidity.balance,
            });
        }

        liquidity.balance -= selected_amount;

        let balance_after = liquidity.balance;
        debug_assert_eq!(balance_after, liquidity.proofs.total_amount()?);

        state.events.push(LedgerEvent {
            mint_url: mint_url.clone(),
            kind: LedgerEventKind::Removed,
            amount: selected_amount,
            balance_after,
            quote_id,
            timestamp: unix_time(),
        });

        Ok(selected)
    }

    /// Whether the inventory of `mint_url` can serve `amount`
    pub async fn can_serve(&self, mint_url: &MintUrl, amount: Amount) -> bool {
        self.balance(mint_url)
            .await
            .map(|balance| balance >= amount)
            .unwrap_or(false)
    }

    /// Current balance on `mint_url`
    pub async fn balance(&self, mint_url: &MintUrl) -> Option<Amount> {
        self.state
            .read()
            .await
            .mints
            .get(mint_url)
            .map(|liquidity| liquidity.balance)
    }

    /// All inventory change records so far
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.state.read().await.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use xmint::nuts::{Id, Proof, SecretKey};
    use xmint::secret::Secret;

    use super::*;

    fn proof(amount: u64) -> Proof {
        Proof::new(
            Amount::from(amount),
            Id::from_str("009a1f293253e41e").expect("valid id"),
            Secret::generate(),
            SecretKey::generate().public_key(),
        )
    }

    fn mint_url() -> MintUrl {
        MintUrl::from_str("http://localhost:3338").expect("valid url")
    }

    #[tokio::test]
    async fn test_balance_tracks_proofs() {
        let ledger = LiquidityLedger::new();
        let url = mint_url();

        ledger
            .add(&url, vec![proof(8), proof(2)], None)
            .await
            .unwrap();
        assert_eq!(ledger.balance(&url).await, Some(Amount::from(10)));

        let selected = ledger.select(&url, Amount::from(8), None).await.unwrap();
        assert_eq!(selected.total_amount().unwrap(), Amount::from(8));
        assert_eq!(ledger.balance(&url).await, Some(Amount::from(2)));

        // Every mutation recorded an event with the running balance
        let events = ledger.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, LedgerEventKind::Added);
        assert_eq!(events[0].balance_after, Amount::from(10));
        assert_eq!(events[1].kind, LedgerEventKind::Removed);
        assert_eq!(events[1].balance_after, Amount::from(2));
    }

    #[tokio::test]
    async fn test_select_is_greedy_largest_first() {
        let ledger = LiquidityLedger::new();
        let url = mint_url();

        ledger
            .add(&url, vec![proof(1), proof(8), proof(2), proof(4)], None)
            .await
            .unwrap();

        let selected = ledger.select(&url, Amount::from(10), None).await.unwrap();
        assert_eq!(
            selected.iter().map(|p| u64::from(p.amount)).collect::<Vec<_>>(),
            vec![8, 4]
        );
    }

    #[tokio::test]
    async fn test_select_insufficient_fails() {
        let ledger = LiquidityLedger::new();
        let url = mint_url();

        ledger.add(&url, vec![proof(4)], None).await.unwrap();

        let err = ledger.select(&url, Amount::from(8), None).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientLiquidity { .. }));

        // Nothing was removed
        assert_eq!(ledger.balance(&url).await, Some(Amount::from(4)));
    }

    #[tokio::test]
    async fn test_remove_by_unique_secret() {
        let ledger = LiquidityLedger::new();
        let url = mint_url();

        let keep = proof(2);
        let spend = proof(8);

        ledger
            .add(&url, vec![keep.clone(), spend.clone()], None)
            .await
            .unwrap();

        ledger.remove(&url, &vec![spend], None).await.unwrap();
        assert_eq!(ledger.balance(&url).await, Some(Amount::from(2)));

        // Removing again is a no-op
        ledger.remove(&url, &vec![keep.clone()], None).await.unwrap();
        ledger.remove(&url, &vec![keep], None).await.unwrap();
        assert_eq!(ledger.balance(&url).await, Some(Amount::ZERO));
    }
}
