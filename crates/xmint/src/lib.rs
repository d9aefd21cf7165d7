#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod amount;
pub mod dhke;
pub mod error;
pub mod mint_url;
pub mod nuts;
pub mod schnorr;
pub mod secret;
pub mod util;

pub use self::amount::Amount;
pub use self::error::Error;
pub use self::mint_url::MintUrl;
pub use self::nuts::*;
pub use self::util::SECP256K1;

#[doc(hidden)]
#[macro_export]
macro_rules! ensure_xmint {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
