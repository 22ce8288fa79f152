use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Interface standard of a token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenType {
    NativeCryptocurrency,
    Erc20,
    Erc875,
    Erc721,
    Erc721ForTickets,
    Erc1155,
}

impl TokenType {
    /// Whether a conforming contract of this type must expose `name()` and `symbol()`.
    ///
    /// ERC-721 and ERC-1155 make both optional (ENS and Enjin omit them).
    pub fn should_have_name_and_symbol(&self) -> bool {
        match self {
            TokenType::NativeCryptocurrency | TokenType::Erc20 | TokenType::Erc875 => true,
            TokenType::Erc721 | TokenType::Erc721ForTickets | TokenType::Erc1155 => false,
        }
    }

    pub fn is_non_fungible(&self) -> bool {
        !matches!(self, TokenType::NativeCryptocurrency | TokenType::Erc20)
    }
}

/// Balance of a non-fungible contract as held token ids (or ERC-875 slots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NonFungibleBalance {
    Erc875(Vec<String>),
    Erc721ForTickets(Vec<String>),
    Balance(Vec<String>),
}

impl NonFungibleBalance {
    pub fn entries(&self) -> &[String] {
        match self {
            NonFungibleBalance::Erc875(v)
            | NonFungibleBalance::Erc721ForTickets(v)
            | NonFungibleBalance::Balance(v) => v,
        }
    }

    /// Number of entries that hold a token.
    ///
    /// ERC-875 balances are fixed-size slot arrays where a zero value marks
    /// an empty slot. Entries that are not numeric count as held.
    pub fn held_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|entry| parse_slot(entry).map_or(true, |v| v != BigUint::from(0u8)))
            .count()
    }
}

/// Parse a decimal or `0x`-prefixed hex slot value.
fn parse_slot(s: &str) -> Option<BigUint> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => BigUint::parse_bytes(digits.as_bytes(), 16),
        None => BigUint::parse_bytes(s.as_bytes(), 10),
    }
}

/// A single detection event. `Name` through `Decimals` are progress
/// notifications; the remaining variants are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ContractData {
    Name(String),
    Symbol(String),
    Balance {
        balance: NonFungibleBalance,
        token_type: TokenType,
    },
    Decimals(u8),
    NonFungibleComplete {
        name: String,
        symbol: String,
        balance: NonFungibleBalance,
        token_type: TokenType,
    },
    FungibleComplete {
        name: String,
        symbol: String,
        decimals: u8,
    },
    DelegateComplete,
    Failed {
        network_reachable: Option<bool>,
    },
}

impl ContractData {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractData::NonFungibleComplete { .. }
                | ContractData::FungibleComplete { .. }
                | ContractData::DelegateComplete
                | ContractData::Failed { .. }
        )
    }
}
