//! Full broker swap against two in-memory mints: quote, accept, fund,
//! complete, claim.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use xmint::mint_url::MintUrl;
use xmint::nuts::nut11::Conditions;
use xmint::nuts::{
    CurrencyUnit, ProofsMethods, SecretKey, SigFlag, SpendingConditions,
};
use xmint::Amount;
use xmint_broker::{Broker, BrokerConfig};
use xmint_wallet::test_utils::InMemoryMint;
use xmint_wallet::Wallet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("xmint_broker=debug,xmint_wallet=debug")
        .init();

    let url_a = MintUrl::from_str("http://mint-a.localhost:3338")?;
    let url_b = MintUrl::from_str("http://mint-b.localhost:3338")?;

    let mint_a = Arc::new(InMemoryMint::new());
    let mint_b = Arc::new(InMemoryMint::new());

    // Broker serves both mints and seeds 20 units of liquidity on mint A
    let broker_wallet_a = Wallet::new(
        url_a.clone(),
        CurrencyUnit::Sat,
        Arc::clone(&mint_a) as Arc<dyn xmint_wallet::MintConnector>,
    );
    let broker_wallet_b = Wallet::new(
        url_b.clone(),
        CurrencyUnit::Sat,
        Arc::clone(&mint_b) as Arc<dyn xmint_wallet::MintConnector>,
    );

    let mut broker = Broker::new(BrokerConfig::default());
    broker.add_mint(broker_wallet_a.clone());
    broker.add_mint(broker_wallet_b);

    let quote_id = broker_wallet_a.mint_quote(Amount::from(20)).await?;
    broker_wallet_a
        .wait_for_paid(&quote_id.quote, Duration::from_secs(5))
        .await?;
    let liquidity = broker_wallet_a
        .mint(&quote_id.quote, Amount::from(20), None)
        .await?;
    broker.deposit(&url_a, liquidity).await?;

    // Client holds 8 units on mint B and wants them on mint A
    let client_key = SecretKey::generate();
    let client_wallet_a = Wallet::new(url_a.clone(), CurrencyUnit::Sat, mint_a);
    let client_wallet_b = Wallet::new(url_b.clone(), CurrencyUnit::Sat, mint_b);

    let funding = client_wallet_b.mint_quote(Amount::from(8)).await?;
    client_wallet_b
        .wait_for_paid(&funding.quote, Duration::from_secs(5))
        .await?;
    let client_funds = client_wallet_b
        .mint(&funding.quote, Amount::from(8), None)
        .await?;

    let quote = broker.request_quote(&url_b, &url_a, Amount::from(8)).await?;
    println!(
        "quote {}: pay {} on {}, receive {} on {} (fee {})",
        quote.id, quote.input_amount, url_b, quote.output_amount, url_a, quote.fee
    );

    let accepted = broker.accept_quote(quote.id, client_key.public_key()).await?;

    // Client locks its source-mint tokens to the broker's tweaked key
    let broker_lock = quote
        .broker_session_pubkey
        .combine(&quote.adaptor_point)?;
    let conditions = SpendingConditions::new_p2pk(
        broker_lock,
        Some(Conditions::new(None, None, None, None, Some(SigFlag::SigInputs))),
    );
    let (locked_for_broker, _change) = client_wallet_b
        .swap_for_locked(client_funds, Amount::from(8), &conditions)
        .await?;

    broker.complete_swap(quote.id, locked_for_broker).await?;

    // Client claims its target-mint tokens with the tweaked key
    let claim_key = client_key.add_tweak(&accepted.adaptor_secret)?;
    let claimed = client_wallet_a
        .claim_locked(accepted.proofs, &claim_key)
        .await?;

    println!(
        "client now holds {} on {}",
        claimed.total_amount()?,
        url_a
    );
    println!(
        "broker balances: {} on {}, {} on {}",
        broker.ledger().balance(&url_a).await.unwrap_or(Amount::ZERO),
        url_a,
        broker.ledger().balance(&url_b).await.unwrap_or(Amount::ZERO),
        url_b,
    );

    Ok(())
}
