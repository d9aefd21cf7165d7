//! Broker errors

use thiserror::Error;
use uuid::Uuid;
use xmint::mint_url::MintUrl;
use xmint::Amount;

use crate::coordinator::SwapState;
use crate::quote::QuoteStatus;

/// Broker Error
#[derive(Debug, Error)]
pub enum Error {
    /// Mint is not served by this broker
    #[error("Unsupported mint: `{0}`")]
    UnsupportedMint(MintUrl),
    /// Source and target mint are the same
    #[error("Source and target mint must differ")]
    SameMint,
    /// Amount is outside of the broker limits
    #[error("Amount must be between `{0}` and `{1}` is `{2}`")]
    AmountOutOfLimits(Amount, Amount, Amount),
    /// Not enough liquidity on the requested mint
    #[error("Insufficient liquidity on `{mint_url}`: requested `{requested}`, available `{available}`")]
    InsufficientLiquidity {
        /// Mint with the shortfall
        mint_url: MintUrl,
        /// Amount that was requested
        requested: Amount,
        /// Amount currently available
        available: Amount,
    },
    /// Quote is not known
    #[error("Unknown quote: `{0}`")]
    UnknownQuote(Uuid),
    /// Quote has expired
    #[error("Quote expired: `{0}`")]
    QuoteExpired(Uuid),
    /// Quote is not in the state the operation requires
    #[error("Quote `{quote_id}` is `{status}`")]
    InvalidQuoteState {
        /// Quote id
        quote_id: Uuid,
        /// Current status of the quote
        status: QuoteStatus,
    },
    /// Coordinator step attempted out of order
    #[error("Cannot `{step}` from state `{from}`")]
    InvalidStateTransition {
        /// State the coordinator was in
        from: SwapState,
        /// Step that was attempted
        step: &'static str,
    },
    /// Step requires a private key the party did not provide
    #[error("Missing private key for `{0}`")]
    MissingPrivateKey(&'static str),
    /// Adaptor points of the two signature sets differ
    #[error("Adaptor point mismatch")]
    AdaptorPointMismatch,
    /// Provided proofs do not match the recorded lock secrets
    #[error("Proofs do not match the recorded lock secrets")]
    SecretsMismatch,
    /// Swap can no longer be cancelled
    #[error("Swap can no longer be cancelled")]
    CannotCancel,
    /// Swap expired before completion
    #[error("Swap expired")]
    SwapExpired,
    /// Proof amounts do not cover the quoted amount
    #[error("Inputs: `{0}`, expected: `{1}`")]
    UnbalancedQuote(Amount, Amount),
    /// Wallet error
    #[error(transparent)]
    Wallet(#[from] xmint_wallet::Error),
    /// XMint core error
    #[error(transparent)]
    XMint(#[from] xmint::error::Error),
    /// Schnorr error
    #[error(transparent)]
    Schnorr(#[from] xmint::schnorr::Error),
    /// NUT00 error
    #[error(transparent)]
    NUT00(#[from] xmint::nuts::nut00::Error),
    /// NUT01 error
    #[error(transparent)]
    NUT01(#[from] xmint::nuts::nut01::Error),
    /// NUT10 error
    #[error(transparent)]
    NUT10(#[from] xmint::nuts::nut10::Error),
    /// NUT11 error
    #[error(transparent)]
    NUT11(#[from] xmint::nuts::nut11::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] xmint::amount::Error),
}
