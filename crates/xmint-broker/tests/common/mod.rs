//! Shared helpers for integration tests
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use xmint::mint_url::MintUrl;
use xmint::nuts::{CurrencyUnit, Proofs};
use xmint::Amount;
use xmint_wallet::test_utils::InMemoryMint;
use xmint_wallet::Wallet;

pub fn mint_url(url: &str) -> MintUrl {
    MintUrl::from_str(url).expect("valid url")
}

pub fn wallet_for(url: &str, mint: Arc<InMemoryMint>) -> Wallet {
    Wallet::new(mint_url(url), CurrencyUnit::Sat, mint)
}

pub async fn mint_proofs(wallet: &Wallet, amount: Amount) -> Proofs {
    let quote = wallet.mint_quote(amount).await.expect("quote");
    wallet
        .wait_for_paid(&quote.quote, Duration::from_secs(1))
        .await
        .expect("paid");
    wallet
        .mint(&quote.quote, amount, None)
        .await
        .expect("minted")
}
