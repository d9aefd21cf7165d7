//! Wallet errors and the mint's wire error responses

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use xmint::Amount;

/// Wallet Error
#[derive(Debug, Error)]
pub enum Error {
    /// Mint does not have a key for amount
    #[error("No key for amount")]
    AmountKey,
    /// Keyset is not known
    #[error("Unknown keyset")]
    UnknownKeySet,
    /// Unsupported unit
    #[error("Unit unsupported")]
    UnsupportedUnit,
    /// Quote is not known
    #[error("Unknown quote")]
    UnknownQuote,
    /// Quote is not paid
    #[error("Quote not paid")]
    UnpaidQuote,
    /// ecash already issued for quote
    #[error("Quote already issued")]
    IssuedQuote,
    /// Quote is expired
    #[error("Quote expired")]
    ExpiredQuote,
    /// Timed out waiting for the mint quote to be paid
    #[error("Timed out waiting for payment")]
    PaymentTimeout,
    /// Not enough proofs to cover the requested amount
    #[error("Insufficient funds")]
    InsufficientFunds,
    /// Token is already spent
    #[error("Token already spent")]
    TokenAlreadySpent,
    /// Transaction unbalanced
    #[error("Inputs: `{0}`, Outputs: `{1}`")]
    TransactionUnbalanced(u64, u64),
    /// Duplicate proofs provided
    #[error("Duplicate proofs")]
    DuplicateProofs,
    /// Amount is outside of allowed range
    #[error("Amount must be between `{0}` and `{1}` is `{2}`")]
    AmountOutofLimitRange(Amount, Amount, Amount),
    /// P2PK spending conditions not met
    #[error("P2PK condition not met `{0}`")]
    P2PKConditionsNotMet(String),
    /// Spending conditions required a witness that was not provided
    #[error("Witness missing or invalid")]
    WitnessMissingOrInvalid,
    /// Mint returned an error response
    #[error("Mint error: {0}")]
    Mint(ErrorResponse),
    /// XMint core error
    #[error(transparent)]
    XMint(#[from] xmint::error::Error),
    /// DHKE error
    #[error(transparent)]
    DHKE(#[from] xmint::dhke::Error),
    /// Schnorr error
    #[error(transparent)]
    Schnorr(#[from] xmint::schnorr::Error),
    /// NUT00 error
    #[error(transparent)]
    NUT00(#[from] xmint::nuts::nut00::Error),
    /// NUT01 error
    #[error(transparent)]
    NUT01(#[from] xmint::nuts::nut01::Error),
    /// NUT02 error
    #[error(transparent)]
    NUT02(#[from] xmint::nuts::nut02::Error),
    /// NUT10 error
    #[error(transparent)]
    NUT10(#[from] xmint::nuts::nut10::Error),
    /// NUT11 error
    #[error(transparent)]
    NUT11(#[from] xmint::nuts::nut11::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] xmint::amount::Error),
    /// Mint url error
    #[error(transparent)]
    MintUrl(#[from] xmint::mint_url::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Custom error
    #[error("`{0}`")]
    Custom(String),
}

impl Error {
    /// Whether the failure is a transport-level error that may be retried
    ///
    /// Mint verification results are final; network failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reqwest(err) => !err.is_builder(),
            Self::Mint(response) => matches!(response.code, ErrorCode::Unknown(code) if code >= 500),
            _ => false,
        }
    }
}

/// Mint error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error Code
    pub code: ErrorCode,
    /// Human readable text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Longer human readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "code: {}, error: {}, detail: {}",
            self.code,
            self.error.clone().unwrap_or_default(),
            self.detail.clone().unwrap_or_default()
        )
    }
}

impl ErrorResponse {
    /// Create new [`ErrorResponse`]
    pub fn new(code: ErrorCode, error: Option<String>, detail: Option<String>) -> Self {
        Self {
            code,
            error,
            detail,
        }
    }

    /// Error response from json Value
    ///
    /// Unstructured bodies are preserved as an unknown error.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(res) => Ok(res),
            Err(_) => Ok(Self {
                code: ErrorCode::Unknown(999),
                error: Some(value.to_string()),
                detail: None,
            }),
        }
    }
}

impl From<ErrorResponse> for Error {
    fn from(err: ErrorResponse) -> Error {
        match err.code {
            ErrorCode::TokenAlreadySpent => Error::TokenAlreadySpent,
            ErrorCode::QuoteNotPaid => Error::UnpaidQuote,
            ErrorCode::TokensAlreadyIssued => Error::IssuedQuote,
            ErrorCode::KeysetNotFound => Error::UnknownKeySet,
            ErrorCode::UnitUnsupported => Error::UnsupportedUnit,
            ErrorCode::TransactionUnbalanced => Error::Mint(err),
            _ => Error::Mint(err),
        }
    }
}

/// Possible error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Blinded Message is already signed
    BlindedMessageAlreadySigned,
    /// Token could not be verified
    TokenNotVerified,
    /// Token is already spent
    TokenAlreadySpent,
    /// Transaction unbalanced
    TransactionUnbalanced,
    /// Unit unsupported
    UnitUnsupported,
    /// Amount outside of allowed range
    AmountOutofLimitRange,
    /// Keyset is not known
    KeysetNotFound,
    /// Keyset is inactive
    KeysetInactive,
    /// Quote is not paid
    QuoteNotPaid,
    /// Tokens have already been issued for quote
    TokensAlreadyIssued,
    /// Minting is disabled
    MintingDisabled,
    /// Quote is pending
    QuotePending,
    /// Quote is expired
    QuoteExpired,
    /// Unknown error code
    Unknown(u16),
}

impl ErrorCode {
    /// Error code from u16
    pub fn from_code(code: u16) -> Self {
        match code {
            10002 => Self::BlindedMessageAlreadySigned,
            10003 => Self::TokenNotVerified,
            11001 => Self::TokenAlreadySpent,
            11002 => Self::TransactionUnbalanced,
            11005 => Self::UnitUnsupported,
            11006 => Self::AmountOutofLimitRange,
            12001 => Self::KeysetNotFound,
            12002 => Self::KeysetInactive,
            20001 => Self::QuoteNotPaid,
            20002 => Self::TokensAlreadyIssued,
            20003 => Self::MintingDisabled,
            20005 => Self::QuotePending,
            20007 => Self::QuoteExpired,
            _ => Self::Unknown(code),
        }
    }

    /// Error code to u16
    pub fn to_code(&self) -> u16 {
        match self {
            Self::BlindedMessageAlreadySigned => 10002,
            Self::TokenNotVerified => 10003,
            Self::TokenAlreadySpent => 11001,
            Self::TransactionUnbalanced => 11002,
            Self::UnitUnsupported => 11005,
            Self::AmountOutofLimitRange => 11006,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::MintingDisabled => 20003,
            Self::QuotePending => 20005,
            Self::QuoteExpired => 20007,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;
        Ok(ErrorCode::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_round_trip() {
        let json = r#"{"code":11001,"error":"Token already spent"}"#;
        let response: ErrorResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.code, ErrorCode::TokenAlreadySpent);
        assert!(matches!(Error::from(response), Error::TokenAlreadySpent));
    }

    #[test]
    fn test_unstructured_error_body_is_preserved() {
        let value = serde_json::json!({"weird": "shape"});
        let response = ErrorResponse::from_value(value).unwrap();

        assert_eq!(response.code, ErrorCode::Unknown(999));
        assert!(response.error.unwrap().contains("weird"));
    }

    #[test]
    fn test_verification_errors_are_not_retryable() {
        assert!(!Error::TokenAlreadySpent.is_retryable());
        assert!(!Error::WitnessMissingOrInvalid.is_retryable());
    }
}
