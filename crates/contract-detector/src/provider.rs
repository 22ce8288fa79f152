use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::address::ContractAddress;
use crate::error::FetchError;
use crate::token::{NonFungibleBalance, TokenType};

/// Metadata queries against a blockchain node.
///
/// Every call is independent and may fail on its own.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_name(&self, address: ContractAddress) -> Result<String, FetchError>;

    async fn get_symbol(&self, address: ContractAddress) -> Result<String, FetchError>;

    async fn get_token_type(&self, address: ContractAddress) -> Result<TokenType, FetchError>;

    async fn get_decimals(&self, address: ContractAddress) -> Result<u8, FetchError>;

    /// Balance of the wallet in a non-fungible contract of the given type.
    async fn get_balance(
        &self,
        address: ContractAddress,
        token_type: TokenType,
    ) -> Result<NonFungibleBalance, FetchError>;
}

/// Hook for loading off-chain asset definitions (TokenScript) of a contract.
pub trait AssetDefinitionStore: Send + Sync {
    /// Start loading definitions for `address`. Must not block.
    fn prefetch(&self, address: ContractAddress);
}

/// Asset definition store that loads nothing.
pub struct NoAssetDefinitions;

impl AssetDefinitionStore for NoAssetDefinitions {
    fn prefetch(&self, _address: ContractAddress) {}
}

/// The individual queries a [`TokenProvider`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    TokenType,
    Name,
    Symbol,
    Decimals,
    Balance,
}

impl Call {
    fn signature(&self) -> &'static str {
        match self {
            Call::TokenType => "supportsInterface(bytes4)",
            Call::Name => "name()",
            Call::Symbol => "symbol()",
            Call::Decimals => "decimals()",
            Call::Balance => "balanceOf(address)",
        }
    }
}

/// Canned responses for one contract.
#[derive(Debug, Clone, Default)]
pub struct StaticContract {
    token_type: Option<TokenType>,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
    balance: Option<Vec<String>>,
    failures: HashMap<Call, FetchError>,
    delays: HashMap<Call, Duration>,
}

impl StaticContract {
    pub fn new(token_type: TokenType) -> Self {
        Self {
            token_type: Some(token_type),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn balance<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.balance = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Make `call` fail with `error`, overriding any canned value.
    pub fn fail(mut self, call: Call, error: FetchError) -> Self {
        self.failures.insert(call, error);
        self
    }

    /// Delay the answer to `call`.
    pub fn delay(mut self, call: Call, delay: Duration) -> Self {
        self.delays.insert(call, delay);
        self
    }

    fn answer<T: Clone>(&self, call: Call, value: &Option<T>) -> Result<T, FetchError> {
        if let Some(err) = self.failures.get(&call) {
            return Err(err.clone());
        }
        value.clone().ok_or_else(|| FetchError::Unsupported {
            call: call.signature().to_string(),
        })
    }
}

/// In-memory token provider for testing and offline use.
pub struct StaticTokenProvider {
    contracts: HashMap<ContractAddress, StaticContract>,
    calls: Mutex<HashMap<(ContractAddress, Call), usize>>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&mut self, address: ContractAddress, contract: StaticContract) {
        self.contracts.insert(address, contract);
    }

    /// How many times `call` was issued for `address`.
    pub fn call_count(&self, address: ContractAddress, call: Call) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&(address, call)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    async fn lookup(
        &self,
        address: ContractAddress,
        call: Call,
    ) -> Result<&StaticContract, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry((address, call)).or_insert(0) += 1;
        }

        let contract = self
            .contracts
            .get(&address)
            .ok_or_else(|| FetchError::Rpc(format!("no contract at {address}")))?;

        if let Some(delay) = contract.delays.get(&call) {
            tokio::time::sleep(*delay).await;
        }
        Ok(contract)
    }
}

impl Default for StaticTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_name(&self, address: ContractAddress) -> Result<String, FetchError> {
        let contract = self.lookup(address, Call::Name).await?;
        contract.answer(Call::Name, &contract.name)
    }

    async fn get_symbol(&self, address: ContractAddress) -> Result<String, FetchError> {
        let contract = self.lookup(address, Call::Symbol).await?;
        contract.answer(Call::Symbol, &contract.symbol)
    }

    async fn get_token_type(&self, address: ContractAddress) -> Result<TokenType, FetchError> {
        let contract = self.lookup(address, Call::TokenType).await?;
        contract.answer(Call::TokenType, &contract.token_type)
    }

    async fn get_decimals(&self, address: ContractAddress) -> Result<u8, FetchError> {
        let contract = self.lookup(address, Call::Decimals).await?;
        contract.answer(Call::Decimals, &contract.decimals)
    }

    async fn get_balance(
        &self,
        address: ContractAddress,
        token_type: TokenType,
    ) -> Result<NonFungibleBalance, FetchError> {
        let contract = self.lookup(address, Call::Balance).await?;
        let ids = contract.answer(Call::Balance, &contract.balance)?;
        match token_type {
            TokenType::Erc875 => Ok(NonFungibleBalance::Erc875(ids)),
            TokenType::Erc721ForTickets => Ok(NonFungibleBalance::Erc721ForTickets(ids)),
            TokenType::Erc721 | TokenType::Erc1155 => Ok(NonFungibleBalance::Balance(ids)),
            TokenType::NativeCryptocurrency | TokenType::Erc20 => Err(FetchError::Unsupported {
                call: format!("non-fungible balance for {token_type:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> ContractAddress {
        ContractAddress::new([byte; 20])
    }

    #[tokio::test]
    async fn test_static_provider_unknown_contract() {
        let provider = StaticTokenProvider::new();
        let result = provider.get_name(addr(1)).await;
        assert!(matches!(result, Err(FetchError::Rpc(_))));
        assert_eq!(provider.call_count(addr(1), Call::Name), 1);
    }

    #[tokio::test]
    async fn test_static_provider_missing_value_is_unsupported() {
        let mut provider = StaticTokenProvider::new();
        provider.insert(addr(1), StaticContract::new(TokenType::Erc721));
        assert_eq!(
            provider.get_symbol(addr(1)).await,
            Err(FetchError::Unsupported {
                call: "symbol()".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_static_provider_failure_overrides_value() {
        let mut provider = StaticTokenProvider::new();
        provider.insert(
            addr(1),
            StaticContract::new(TokenType::Erc20)
                .decimals(18)
                .fail(Call::Decimals, FetchError::Rpc("down".into())),
        );
        assert_eq!(
            provider.get_decimals(addr(1)).await,
            Err(FetchError::Rpc("down".into()))
        );
    }

    #[tokio::test]
    async fn test_static_provider_balance_shape_follows_type() {
        let mut provider = StaticTokenProvider::new();
        provider.insert(
            addr(1),
            StaticContract::new(TokenType::Erc875).balance(["0x01"]),
        );
        assert_eq!(
            provider.get_balance(addr(1), TokenType::Erc875).await,
            Ok(NonFungibleBalance::Erc875(vec!["0x01".to_string()]))
        );
        assert_eq!(
            provider.get_balance(addr(1), TokenType::Erc721).await,
            Ok(NonFungibleBalance::Balance(vec!["0x01".to_string()]))
        );
        assert!(provider.get_balance(addr(1), TokenType::Erc20).await.is_err());
        assert_eq!(provider.call_count(addr(1), Call::Balance), 3);
    }
}
