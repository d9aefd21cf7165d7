//! Swap coordinator, liquidity ledger and broker service for trustless
//! cross-mint ecash swaps
//!
//! A [`SwapCoordinator`] drives one peer-to-peer atomic swap through its
//! state machine; a [`Broker`] holds liquidity on several mints and serves
//! quote-based swaps against it, with the [`LiquidityLedger`] as the only
//! shared mutable state.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod broker;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod quote;

pub use broker::{AcceptedQuote, Broker, BrokerConfig};
pub use coordinator::{SwapCoordinator, SwapEvent, SwapParty, SwapState};
pub use error::Error;
pub use ledger::{LedgerEvent, LedgerEventKind, LiquidityLedger};
pub use quote::{QuoteStatus, SwapQuote};
