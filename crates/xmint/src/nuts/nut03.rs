//! NUT-03: Swap tokens
//!
//! <https://github.com/cashubtc/nuts/blob/main/03.md>

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindSignature, BlindedMessage, Proofs};
use crate::Amount;

/// NUT03 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Amount overflow
    #[error("Amount overflow")]
    AmountOverflow,
}

/// Swap request: atomically retire `inputs` and issue signatures over
/// `outputs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Proofs that are to be spent
    pub inputs: Proofs,
    /// Blinded messages for new tokens
    pub outputs: Vec<BlindedMessage>,
}

impl SwapRequest {
    /// Create new [`SwapRequest`]
    pub fn new(inputs: Proofs, outputs: Vec<BlindedMessage>) -> Self {
        Self { inputs, outputs }
    }

    /// Total value of the inputs
    pub fn input_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.inputs.iter().map(|proof| proof.amount))
            .map_err(|_| Error::AmountOverflow)
    }

    /// Total value of the outputs
    pub fn output_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.outputs.iter().map(|output| output.amount))
            .map_err(|_| Error::AmountOverflow)
    }
}

/// Swap response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResponse {
    /// Blind signatures over the requested outputs
    pub signatures: Vec<BlindSignature>,
}

impl SwapResponse {
    /// Create new [`SwapResponse`]
    pub fn new(signatures: Vec<BlindSignature>) -> Self {
        Self { signatures }
    }
}
