//! Url

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Invalid URL structure
    #[error("Invalid URL")]
    InvalidUrl,
}

/// MintUrl Url
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MintUrl(String);

impl MintUrl {
    fn format_url(url: &str) -> Result<String, Error> {
        if url.is_empty() {
            return Err(Error::InvalidUrl);
        }
        let url = url.trim_end_matches('/');
        // Parse to confirm the url is valid and normalise host casing
        let formatted_url = Url::parse(url)?;
        let host = formatted_url.host_str().ok_or(Error::InvalidUrl)?;

        let mut formatted = format!("{}://{}", formatted_url.scheme(), host);
        if let Some(port) = formatted_url.port() {
            formatted.push_str(&format!(":{port}"));
        }
        let path = formatted_url.path().trim_end_matches('/');
        formatted.push_str(path);
        Ok(formatted)
    }

    /// Join onto url
    pub fn join(&self, path: &str) -> Result<Url, Error> {
        let url: Url = self.try_into()?;
        // Ensure the base path ends with a slash so the last segment is kept
        let mut url_string = url.to_string();
        if !url_string.ends_with('/') {
            url_string.push('/');
        }
        Ok(Url::parse(&url_string)?.join(path)?)
    }

    /// Append path elements onto the URL
    pub fn join_paths(&self, path_elements: &[&str]) -> Result<Url, Error> {
        self.join(&path_elements.join("/"))
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MintUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let formatted_url = Self::format_url(url)?;
        Ok(Self(formatted_url))
    }
}

impl TryFrom<MintUrl> for Url {
    type Error = Error;

    fn try_from(mint_url: MintUrl) -> Result<Url, Self::Error> {
        Ok(Self::parse(&mint_url.0)?)
    }
}

impl TryFrom<&MintUrl> for Url {
    type Error = Error;

    fn try_from(mint_url: &MintUrl) -> Result<Url, Self::Error> {
        Ok(Self::parse(mint_url.0.as_str())?)
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
