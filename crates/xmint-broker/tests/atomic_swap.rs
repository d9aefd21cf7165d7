//! Two-party atomic swap between two in-memory mints

use std::sync::Arc;
use std::time::Duration;

use xmint::nuts::{PreMintSecrets, ProofsMethods, SecretKey, State};
use xmint::util::unix_time;
use xmint::Amount;
use xmint_broker::{Error, SwapCoordinator, SwapParty, SwapState};
use xmint_wallet::test_utils::InMemoryMint;
use xmint_wallet::Wallet;

mod common;

use common::{mint_url, wallet_for};

const MINT_A: &str = "http://mint-a.localhost:3338";
const MINT_B: &str = "http://mint-b.localhost:3338";

struct Party {
    key: SecretKey,
    home_wallet: Wallet,
    away_wallet: Wallet,
}

/// Set up two mints with one party on each; each party holds a wallet for
/// both mints
fn setup() -> (Party, Party) {
    let mint_a = Arc::new(InMemoryMint::new());
    let mint_b = Arc::new(InMemoryMint::new());

    let alice = Party {
        key: SecretKey::generate(),
        home_wallet: wallet_for(MINT_A, Arc::clone(&mint_a)),
        away_wallet: wallet_for(MINT_B, Arc::clone(&mint_b)),
    };
    let bob = Party {
        key: SecretKey::generate(),
        home_wallet: wallet_for(MINT_B, mint_b),
        away_wallet: wallet_for(MINT_A, mint_a),
    };

    (alice, bob)
}

fn coordinator(alice: &Party, bob: &Party, amount: Amount) -> SwapCoordinator {
    let initiator = SwapParty::from_secret_key(alice.key.clone(), mint_url(MINT_A), amount);
    let responder = SwapParty::from_secret_key(bob.key.clone(), mint_url(MINT_B), amount);

    SwapCoordinator::new(initiator, responder, Amount::ZERO, unix_time() + 60)
}

/// Fund `amount` of proofs carrying exactly the given lock secrets on the
/// wallet's mint
async fn fund_locked(
    wallet: &Wallet,
    amount: Amount,
    secrets: &[xmint::secret::Secret],
) -> xmint::nuts::Proofs {
    let keyset = wallet.active_keyset().await.expect("keyset");
    let premint = PreMintSecrets::from_secrets(keyset.id, amount.split(), secrets.to_vec())
        .expect("premint");

    let quote = wallet.mint_quote(amount).await.expect("quote");
    wallet
        .wait_for_paid(&quote.quote, Duration::from_secs(1))
        .await
        .expect("paid");
    wallet
        .mint_premint(&quote.quote, premint)
        .await
        .expect("minted locked")
}

#[tokio::test]
async fn test_two_mint_atomic_swap() {
    let (alice, bob) = setup();
    let amount = Amount::from(8);

    let mut swap = coordinator(&alice, &bob, amount);

    swap.initialize().expect("initialize");
    swap.create_secrets().expect("create secrets");

    // Each side funds its leg on its home mint with the agreed lock
    // secrets
    let alice_locked =
        fund_locked(&alice.home_wallet, amount, swap.initiator_lock_secrets()).await;
    let bob_locked =
        fund_locked(&bob.home_wallet, amount, swap.responder_lock_secrets()).await;

    swap.create_adaptor_signatures().expect("adaptor signatures");
    swap.verify_adaptor_signatures().expect("verification");

    // Responder claims first; this is the atomicity-enforcing ordering
    let bob_claimed = swap
        .responder_claim(&bob.away_wallet, alice_locked)
        .await
        .expect("responder claim");
    assert_eq!(bob_claimed.total_amount().unwrap(), amount);

    // The completed signature is public; the initiator extracts and claims
    let published = swap.published_signatures()[0];
    swap.extract_secret(&published).expect("extract");

    let alice_claimed = swap
        .initiator_claim(&alice.away_wallet, bob_locked)
        .await
        .expect("initiator claim");
    assert_eq!(alice_claimed.total_amount().unwrap(), amount);

    assert_eq!(swap.state(), SwapState::Completed);

    // Each party now holds spendable tokens on the opposite mint
    let states = bob
        .away_wallet
        .check_proofs_spent(&bob_claimed)
        .await
        .expect("check");
    assert!(states.iter().all(|s| s.state == State::Unspent));

    let states = alice
        .away_wallet
        .check_proofs_spent(&alice_claimed)
        .await
        .expect("check");
    assert!(states.iter().all(|s| s.state == State::Unspent));
}

#[tokio::test]
async fn test_initiator_completes_from_published_signature_alone() {
    let (alice, bob) = setup();
    let amount = Amount::from(8);

    let mut swap = coordinator(&alice, &bob, amount);

    swap.initialize().expect("initialize");
    swap.create_secrets().expect("create secrets");

    let alice_locked =
        fund_locked(&alice.home_wallet, amount, swap.initiator_lock_secrets()).await;
    let bob_locked =
        fund_locked(&bob.home_wallet, amount, swap.responder_lock_secrets()).await;

    swap.create_adaptor_signatures().expect("adaptor signatures");
    swap.verify_adaptor_signatures().expect("verification");

    swap.responder_claim(&bob.away_wallet, alice_locked)
        .await
        .expect("responder claim");

    // The responder has claimed and gone silent. The published signature
    // is the only thing the initiator has; it is enough to finish even
    // after connectivity to the source mint comes back later.
    let published = swap.published_signatures()[0];

    swap.extract_secret(&published).expect("extract");
    let claimed = swap
        .initiator_claim(&alice.away_wallet, bob_locked)
        .await
        .expect("initiator claim after outage");

    assert_eq!(claimed.total_amount().unwrap(), amount);
    assert_eq!(swap.state(), SwapState::Completed);
}

#[tokio::test]
async fn test_invalid_adaptor_fails_before_any_mint_interaction() {
    let (alice, bob) = setup();
    let amount = Amount::from(8);

    // The responder advertises Bob's pubkey but signs with a rogue key,
    // so its adaptor signatures cannot verify
    let initiator = SwapParty::from_secret_key(alice.key.clone(), mint_url(MINT_A), amount);
    let responder = SwapParty {
        pubkey: bob.key.public_key(),
        secret_key: Some(SecretKey::generate()),
        mint_url: mint_url(MINT_B),
        amount,
    };

    let mut swap = SwapCoordinator::new(initiator, responder, Amount::ZERO, unix_time() + 60);

    swap.initialize().expect("initialize");
    swap.create_secrets().expect("create secrets");
    swap.create_adaptor_signatures().expect("adaptor signatures");

    let err = swap.verify_adaptor_signatures().unwrap_err();
    assert!(matches!(err, Error::Schnorr(_)));

    // The swap is dead before any token was minted or spent
    assert_eq!(swap.state(), SwapState::Failed);
}
