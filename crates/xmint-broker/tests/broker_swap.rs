//! Broker-mediated swaps against two in-memory mints

use std::sync::Arc;
use std::time::Duration;

use xmint::nuts::nut11::Conditions;
use xmint::nuts::{ProofsMethods, SecretKey, SigFlag, SpendingConditions, State};
use xmint::Amount;
use xmint_broker::{Broker, BrokerConfig, Error, QuoteStatus};
use xmint_wallet::test_utils::InMemoryMint;
use xmint_wallet::Wallet;

mod common;

use common::{mint_proofs, mint_url, wallet_for};

const MINT_A: &str = "http://mint-a.localhost:3338";
const MINT_B: &str = "http://mint-b.localhost:3338";

struct Setup {
    broker: Broker,
    client_wallet_a: Wallet,
    client_wallet_b: Wallet,
}

/// Broker serving mint A and mint B, with `liquidity` deposited on mint A
async fn setup(config: BrokerConfig, liquidity: Amount) -> Setup {
    let mint_a = Arc::new(InMemoryMint::new());
    let mint_b = Arc::new(InMemoryMint::new());

    let broker_wallet_a = wallet_for(MINT_A, Arc::clone(&mint_a));
    let broker_wallet_b = wallet_for(MINT_B, Arc::clone(&mint_b));

    let mut broker = Broker::new(config);
    broker.add_mint(broker_wallet_a.clone());
    broker.add_mint(broker_wallet_b);

    if liquidity > Amount::ZERO {
        let proofs = mint_proofs(&broker_wallet_a, liquidity).await;
        broker
            .deposit(&mint_url(MINT_A), proofs)
            .await
            .expect("deposit");
    }

    Setup {
        broker,
        client_wallet_a: wallet_for(MINT_A, mint_a),
        client_wallet_b: wallet_for(MINT_B, mint_b),
    }
}

#[tokio::test]
async fn test_broker_swap_with_fee() {
    let setup = setup(BrokerConfig::default(), Amount::from(20)).await;
    let broker = &setup.broker;

    let client_key = SecretKey::generate();

    // Client wants 8 units moved from mint B to mint A at 0.5%
    let quote = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("quote");

    assert_eq!(quote.input_amount, Amount::from(8));
    assert_eq!(quote.output_amount, Amount::from(7));
    assert_eq!(quote.fee, Amount::from(1));

    // Accept: the broker hands out target-mint tokens locked to
    // `client + T` together with the adaptor secret
    let accepted = broker
        .accept_quote(quote.id, client_key.public_key())
        .await
        .expect("accept");
    assert_eq!(accepted.proofs.total_amount().unwrap(), Amount::from(7));
    assert_eq!(
        broker.quote(quote.id).await.unwrap().status,
        QuoteStatus::Accepted
    );

    // Client funds the source leg: 8 units on mint B locked to the
    // broker's tweaked session key
    let broker_lock = quote
        .broker_session_pubkey
        .combine(&quote.adaptor_point)
        .expect("tweak");
    let conditions = SpendingConditions::new_p2pk(
        broker_lock,
        Some(Conditions::new(None, None, None, None, Some(SigFlag::SigInputs))),
    );

    let client_funds = mint_proofs(&setup.client_wallet_b, Amount::from(8)).await;
    let (locked_for_broker, change) = setup
        .client_wallet_b
        .swap_for_locked(client_funds, Amount::from(8), &conditions)
        .await
        .expect("lock for broker");
    assert!(change.is_empty());

    broker
        .complete_swap(quote.id, locked_for_broker)
        .await
        .expect("complete");

    // Client claims its locked target tokens with `client_key + t`
    let claim_key = client_key
        .add_tweak(&accepted.adaptor_secret)
        .expect("tweak key");
    let claimed = setup
        .client_wallet_a
        .claim_locked(accepted.proofs, &claim_key)
        .await
        .expect("client claim");

    assert_eq!(claimed.total_amount().unwrap(), Amount::from(7));
    let states = setup
        .client_wallet_a
        .check_proofs_spent(&claimed)
        .await
        .expect("check");
    assert!(states.iter().all(|s| s.state == State::Unspent));

    // Broker ledger: -7 on the target mint, +8 on the source mint
    assert_eq!(
        broker.ledger().balance(&mint_url(MINT_A)).await,
        Some(Amount::from(13))
    );
    assert_eq!(
        broker.ledger().balance(&mint_url(MINT_B)).await,
        Some(Amount::from(8))
    );

    let record = broker.quote(quote.id).await.unwrap();
    assert_eq!(record.status, QuoteStatus::Completed);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn test_complete_swap_is_idempotent() {
    let setup = setup(BrokerConfig::default(), Amount::from(20)).await;
    let broker = &setup.broker;

    let client_key = SecretKey::generate();

    let quote = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("quote");
    broker
        .accept_quote(quote.id, client_key.public_key())
        .await
        .expect("accept");

    let broker_lock = quote
        .broker_session_pubkey
        .combine(&quote.adaptor_point)
        .expect("tweak");
    let conditions = SpendingConditions::new_p2pk(
        broker_lock,
        Some(Conditions::new(None, None, None, None, Some(SigFlag::SigInputs))),
    );

    let client_funds = mint_proofs(&setup.client_wallet_b, Amount::from(8)).await;
    let (locked_for_broker, _change) = setup
        .client_wallet_b
        .swap_for_locked(client_funds, Amount::from(8), &conditions)
        .await
        .expect("lock for broker");

    broker
        .complete_swap(quote.id, locked_for_broker.clone())
        .await
        .expect("complete");

    let events_after_first = broker.ledger().events().await.len();
    let balance_after_first = broker.ledger().balance(&mint_url(MINT_B)).await;

    // Completing again has no additional on-ledger effect
    broker
        .complete_swap(quote.id, locked_for_broker)
        .await
        .expect("second complete is a no-op");

    assert_eq!(broker.ledger().events().await.len(), events_after_first);
    assert_eq!(
        broker.ledger().balance(&mint_url(MINT_B)).await,
        balance_after_first
    );
}

#[tokio::test]
async fn test_quote_expires_before_acceptance() {
    let config = BrokerConfig {
        quote_ttl: Duration::ZERO,
        ..Default::default()
    };
    let setup = setup(config, Amount::from(20)).await;
    let broker = &setup.broker;

    let quote = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("quote");

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let err = broker
        .accept_quote(quote.id, SecretKey::generate().public_key())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QuoteExpired(_)));

    // No liquidity was moved
    assert_eq!(
        broker.ledger().balance(&mint_url(MINT_A)).await,
        Some(Amount::from(20))
    );
    assert_eq!(
        broker.quote(quote.id).await.unwrap().status,
        QuoteStatus::Expired
    );
}

#[tokio::test]
async fn test_expire_stale_quotes_sweeps_pending() {
    let config = BrokerConfig {
        quote_ttl: Duration::ZERO,
        ..Default::default()
    };
    let setup = setup(config, Amount::from(20)).await;
    let broker = &setup.broker;

    let quote = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("quote");

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(broker.expire_stale_quotes().await, 1);
    assert_eq!(
        broker.quote(quote.id).await.unwrap().status,
        QuoteStatus::Expired
    );
}

#[tokio::test]
async fn test_concurrent_accepts_cannot_overrun_liquidity() {
    // 10 units of liquidity; two quotes wanting 7 each
    let setup = setup(BrokerConfig::default(), Amount::from(10)).await;
    let broker = &setup.broker;

    let quote_one = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("first quote");
    let quote_two = broker
        .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
        .await
        .expect("second quote");

    let key_one = SecretKey::generate();
    let key_two = SecretKey::generate();

    let (result_one, result_two) = futures::join!(
        broker.accept_quote(quote_one.id, key_one.public_key()),
        broker.accept_quote(quote_two.id, key_two.public_key()),
    );

    // Exactly one acceptance succeeds; the other fails with a structured
    // liquidity error
    let (succeeded, failed) = match (&result_one, &result_two) {
        (Ok(_), Err(err)) => (result_one.as_ref().ok(), err),
        (Err(err), Ok(_)) => (result_two.as_ref().ok(), err),
        other => panic!("expected exactly one success, got {:?}", other.0.is_ok()),
    };

    assert!(succeeded.is_some());
    assert!(matches!(failed, Error::InsufficientLiquidity { .. }));

    // The ledger invariant held: locked 7, the remainder is still there
    let locked = succeeded.map(|a| a.proofs.total_amount().expect("sum"));
    assert_eq!(locked, Some(Amount::from(7)));
    assert_eq!(
        broker.ledger().balance(&mint_url(MINT_A)).await,
        Some(Amount::from(3))
    );
}

#[tokio::test]
async fn test_quote_request_validations() {
    let setup = setup(BrokerConfig::default(), Amount::from(4)).await;
    let broker = &setup.broker;

    // Same mint on both sides
    assert!(matches!(
        broker
            .request_quote(&mint_url(MINT_A), &mint_url(MINT_A), Amount::from(8))
            .await,
        Err(Error::SameMint)
    ));

    // Unknown mint
    assert!(matches!(
        broker
            .request_quote(&mint_url("http://unknown.localhost"), &mint_url(MINT_A), Amount::from(8))
            .await,
        Err(Error::UnsupportedMint(_))
    ));

    // Amount outside the limits
    let config_limited = BrokerConfig {
        min_amount: Amount::from(4),
        max_amount: Amount::from(16),
        ..Default::default()
    };
    let limited = setup_with_config(config_limited).await;
    assert!(matches!(
        limited
            .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(2))
            .await,
        Err(Error::AmountOutOfLimits(..))
    ));

    // Not enough liquidity for the output amount
    assert!(matches!(
        broker
            .request_quote(&mint_url(MINT_B), &mint_url(MINT_A), Amount::from(8))
            .await,
        Err(Error::InsufficientLiquidity { .. })
    ));
}

async fn setup_with_config(config: BrokerConfig) -> Broker {
    let mint_a = Arc::new(InMemoryMint::new());
    let mint_b = Arc::new(InMemoryMint::new());

    let mut broker = Broker::new(config);
    broker.add_mint(wallet_for(MINT_A, mint_a));
    broker.add_mint(wallet_for(MINT_B, mint_b));
    broker
}
