use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const BITCOIN: &str = "bitcoin";
pub const LITECOIN: &str = "litecoin";
pub const DOGE: &str = "doge";
pub const DASH: &str = "dash";
pub const ZCASH: &str = "zcash";
pub const BITCOIN_CASH: &str = "bitcoin_cash";

/// Name of the blockchain network a responder declares it indexes.
///
/// Network names are compared verbatim. The engine does not restrict the set of networks, the
/// well-known names are only provided as constants for convenience.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(String);

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn bitcoin() -> Self {
        Self::new(BITCOIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Network {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Network {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for Network {
    fn borrow(&self) -> &str {
        &self.0
    }
}
