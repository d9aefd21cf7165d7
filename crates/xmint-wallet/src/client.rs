//! Mint client
//!
//! A thin stateless caller translating semantic mint operations into the
//! mint's wire protocol. Proof and witness bytes pass through untouched.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;
use xmint::mint_url::MintUrl;
use xmint::nuts::{
    CheckStateRequest, CheckStateResponse, KeySet, KeysResponse, KeysetResponse,
    MeltQuoteBolt11Request, MeltQuoteBolt11Response, MintInfo, MintQuoteBolt11Request,
    MintQuoteBolt11Response, MintRequest, MintResponse, SwapRequest, SwapResponse,
};

use crate::error::{Error, ErrorResponse};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interface to a mint
///
/// The seam between the token engine and a concrete mint backend; the HTTP
/// client and the in-memory test mint both implement it.
#[async_trait]
pub trait MintConnector: Debug + Send + Sync {
    /// Get Mint Info [NUT-06]
    async fn get_mint_info(&self) -> Result<MintInfo, Error>;
    /// Get Active Mint Keys [NUT-01]
    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error>;
    /// Get Keysets [NUT-02]
    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error>;
    /// Mint Quote [NUT-04]
    async fn post_mint_quote(
        &self,
        request: MintQuoteBolt11Request,
    ) -> Result<MintQuoteBolt11Response, Error>;
    /// Mint Quote status
    async fn get_mint_quote_status(
        &self,
        quote_id: &str,
    ) -> Result<MintQuoteBolt11Response, Error>;
    /// Mint Tokens [NUT-04]
    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error>;
    /// Melt Quote [NUT-05]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error>;
    /// Swap Token [NUT-03]
    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error>;
    /// Spendable check [NUT-07]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error>;
}

/// Http Client
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    mint_url: MintUrl,
}

impl HttpClient {
    /// Create new [`HttpClient`]
    pub fn new(mint_url: MintUrl) -> Result<Self, Error> {
        let inner = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { inner, mint_url })
    }

    /// Mint url of the client
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }

    async fn http_get<R>(&self, path_elements: &[&str]) -> Result<R, Error>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = self.mint_url.join_paths(path_elements)?;
        let res = self.inner.get(url).send().await?.json::<Value>().await?;

        decode_response(res)
    }

    async fn http_post<B, R>(&self, path_elements: &[&str], body: &B) -> Result<R, Error>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = self.mint_url.join_paths(path_elements)?;
        let res = self
            .inner
            .post(url)
            .json(body)
            .send()
            .await?
            .json::<Value>()
            .await?;

        decode_response(res)
    }
}

fn decode_response<R>(value: Value) -> Result<R, Error>
where
    R: serde::de::DeserializeOwned,
{
    match serde_json::from_value::<R>(value.clone()) {
        Ok(response) => Ok(response),
        Err(err) => {
            tracing::warn!("Mint response did not decode: {}", err);
            Err(ErrorResponse::from_value(value)?.into())
        }
    }
}

#[async_trait]
impl MintConnector for HttpClient {
    /// Get Mint Info [NUT-06]
    #[instrument(skip(self), fields(mint_url = %self.mint_url))]
    async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        self.http_get(&["v1", "info"]).await
    }

    /// Get Active Mint Keys [NUT-01]
    #[instrument(skip(self), fields(mint_url = %self.mint_url))]
    async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error> {
        let response: KeysResponse = self.http_get(&["v1", "keys"]).await?;
        Ok(response.keysets)
    }

    /// Get Keysets [NUT-02]
    #[instrument(skip(self), fields(mint_url = %self.mint_url))]
    async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error> {
        self.http_get(&["v1", "keysets"]).await
    }

    /// Mint Quote [NUT-04]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_mint_quote(
        &self,
        request: MintQuoteBolt11Request,
    ) -> Result<MintQuoteBolt11Response, Error> {
        self.http_post(&["v1", "mint", "quote", "bolt11"], &request)
            .await
    }

    /// Mint Quote status
    #[instrument(skip(self), fields(mint_url = %self.mint_url))]
    async fn get_mint_quote_status(
        &self,
        quote_id: &str,
    ) -> Result<MintQuoteBolt11Response, Error> {
        self.http_get(&["v1", "mint", "quote", "bolt11", quote_id])
            .await
    }

    /// Mint Tokens [NUT-04]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_mint(&self, request: MintRequest) -> Result<MintResponse, Error> {
        self.http_post(&["v1", "mint", "bolt11"], &request).await
    }

    /// Melt Quote [NUT-05]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        self.http_post(&["v1", "melt", "quote", "bolt11"], &request)
            .await
    }

    /// Swap Token [NUT-03]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        self.http_post(&["v1", "swap"], &request).await
    }

    /// Spendable check [NUT-07]
    #[instrument(skip(self, request), fields(mint_url = %self.mint_url))]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        self.http_post(&["v1", "checkstate"], &request).await
    }
}
