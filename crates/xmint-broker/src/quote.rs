//! Swap quotes
//!
//! The public quote handed to a client plus its lifecycle states. The
//! quote doubles as the durable per-swap record; the quote id is the
//! correlation key for ledger events.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xmint::mint_url::MintUrl;
use xmint::nuts::PublicKey;
use xmint::Amount;

/// Lifecycle states of a [`SwapQuote`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteStatus {
    /// Quote issued, waiting for the client to accept
    Pending,
    /// Client accepted; locked tokens have been handed out
    Accepted,
    /// Swap settled on both mints
    Completed,
    /// Quote lapsed before completion
    Expired,
    /// Swap failed after acceptance
    Failed,
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A broker quote for one cross-mint swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuote {
    /// Quote id; correlation key for all records of the swap
    pub id: Uuid,
    /// Mint the client pays on
    pub source_mint: MintUrl,
    /// Mint the client receives on
    pub target_mint: MintUrl,
    /// Amount the client pays on the source mint
    pub input_amount: Amount,
    /// Amount the client receives on the target mint
    pub output_amount: Amount,
    /// Broker fee, `input_amount - output_amount`
    pub fee: Amount,
    /// Fee rate the fee was computed from
    pub fee_rate: f64,
    /// Per-quote broker session public key
    pub broker_session_pubkey: PublicKey,
    /// Adaptor point `T` the locked outputs are tweaked by
    pub adaptor_point: PublicKey,
    /// Seconds since unix epoch at creation
    pub created_at: u64,
    /// Seconds since unix epoch after which the quote cannot be used
    pub expires_at: u64,
    /// Seconds since unix epoch at completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    /// Lifecycle state
    pub status: QuoteStatus,
}

impl SwapQuote {
    /// Whether the quote has lapsed at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}
