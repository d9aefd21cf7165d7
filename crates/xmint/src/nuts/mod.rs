//! Nuts
//!
//! See all at <https://github.com/cashubtc/nuts>

pub mod nut00;
pub mod nut01;
pub mod nut02;
pub mod nut03;
pub mod nut04;
pub mod nut05;
pub mod nut06;
pub mod nut07;
pub mod nut10;
pub mod nut11;

pub use nut00::{
    BlindSignature, BlindedMessage, CurrencyUnit, PaymentMethod, Proof, Proofs, ProofsMethods,
    Witness,
};
#[cfg(feature = "wallet")]
pub use nut00::{PreMint, PreMintSecrets};
pub use nut01::{Keys, KeysResponse, PublicKey, SecretKey};
#[cfg(feature = "mint")]
pub use nut01::{MintKeyPair, MintKeys};
#[cfg(feature = "mint")]
pub use nut02::MintKeySet;
pub use nut02::{Id, KeySet, KeySetInfo, KeysetResponse};
pub use nut03::{SwapRequest, SwapResponse};
pub use nut04::{
    MintQuoteBolt11Request, MintQuoteBolt11Response, MintRequest, MintResponse,
};
pub use nut05::{MeltQuoteBolt11Request, MeltQuoteBolt11Response};
pub use nut06::{MintInfo, MintVersion, Nuts, SupportedSettings};
pub use nut07::{CheckStateRequest, CheckStateResponse, ProofState, State};
pub use nut10::{Kind, Secret as Nut10Secret, SecretData};
pub use nut11::{Conditions, EnforceSigFlag, P2PKWitness, SigFlag, SpendingConditions};
