//! Mint client and token engine for trustless cross-mint ecash swaps
//!
//! [`HttpClient`] translates semantic mint operations into the mint's wire
//! protocol; [`Wallet`] builds on the [`MintConnector`] seam to mint,
//! relock and claim bearer tokens on a single mint.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod wallet;

pub use client::{HttpClient, MintConnector};
pub use error::{Error, ErrorCode, ErrorResponse};
pub use wallet::Wallet;
