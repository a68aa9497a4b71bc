//! Chains the ledger keeps balances on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A settlement chain, identified on the wire by its uppercase symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Eth,
    Btc,
    /// Legacy off-chain USD balances.
    Usd,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Eth, Chain::Btc, Chain::Usd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Btc => "BTC",
            Chain::Usd => "USD",
        }
    }
}

impl FromStr for Chain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ETH" => Ok(Chain::Eth),
            "BTC" => Ok(Chain::Btc),
            "USD" => Ok(Chain::Usd),
            other => Err(ParseError::UnknownChain(other.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip() {
        for chain in Chain::ALL {
            assert_eq!(chain.as_str().parse::<Chain>().unwrap(), chain);
        }
        assert!("eth".parse::<Chain>().is_err());
        assert_eq!(serde_json::to_string(&Chain::Btc).unwrap(), "\"BTC\"");
    }
}
