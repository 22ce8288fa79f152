use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

use crate::address::ContractAddress;
use crate::config::DetectorConfig;
use crate::error::{Error, FetchError};
use crate::provider::{AssetDefinitionStore, NoAssetDefinitions, TokenProvider};
use crate::reachability::Reachability;
use crate::token::{ContractData, NonFungibleBalance, TokenType};

/// Detects the token type and metadata of a contract.
///
/// Type, name and symbol are queried concurrently as soon as [`fetch`](Self::fetch)
/// is called; the resolved type decides whether decimals or a balance are
/// fetched next. Progress is pushed as partial [`ContractData`] events and
/// the stream closes after exactly one terminal event.
pub struct ContractDataDetector {
    address: ContractAddress,
    provider: Arc<dyn TokenProvider>,
    reachability: Arc<dyn Reachability>,
    assets: Arc<dyn AssetDefinitionStore>,
    config: DetectorConfig,
}

impl ContractDataDetector {
    pub fn new(
        address: ContractAddress,
        provider: Arc<dyn TokenProvider>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        Self {
            address,
            provider,
            reachability,
            assets: Arc::new(NoAssetDefinitions),
            config: DetectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Result<Self, Error> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_asset_definitions(mut self, assets: Arc<dyn AssetDefinitionStore>) -> Self {
        self.assets = assets;
        self
    }

    pub fn address(&self) -> ContractAddress {
        self.address
    }

    /// Start detection on the current tokio runtime.
    ///
    /// Panics if called outside a runtime.
    pub fn fetch(self) -> mpsc::Receiver<ContractData> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let span = tracing::debug_span!(
            "contract_detection",
            address = %self.address.to_checksum()
        );
        tokio::spawn(self.run(tx).instrument(span));
        rx
    }

    /// Run detection to completion and collect every event.
    pub async fn fetch_all(self) -> Vec<ContractData> {
        let mut rx = self.fetch();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn run(self, tx: mpsc::Sender<ContractData>) {
        self.assets.prefetch(self.address);

        let mut tasks = JoinSet::new();
        self.spawn_fetch(&mut tasks, Fetch::TokenType);
        self.spawn_fetch(&mut tasks, Fetch::Name);
        self.spawn_fetch(&mut tasks, Fetch::Symbol);

        let mut detection = Detection::default();
        while let Some(joined) = tasks.join_next().await {
            let step = match joined {
                Ok(completion) => detection.apply(completion, self.reachability.as_ref()),
                Err(err) => {
                    warn!(error = %err, "fetch task did not complete");
                    detection.fail(self.reachability.as_ref())
                }
            };

            if let Some(fetch) = step.follow_up {
                self.spawn_fetch(&mut tasks, fetch);
            }

            for event in step.events {
                let terminal = event.is_terminal();
                if tx.send(event).await.is_err() {
                    debug!("receiver dropped, abandoning detection");
                    tasks.detach_all();
                    return;
                }
                if terminal {
                    // Outstanding fetches finish on their own; their results are unused.
                    tasks.detach_all();
                    return;
                }
            }
        }

        if !detection.finished {
            warn!("all fetches settled without a decision");
            let step = detection.fail(self.reachability.as_ref());
            for event in step.events {
                if tx.send(event).await.is_err() {
                    debug!("receiver dropped before failure was delivered");
                }
            }
        }
    }

    fn spawn_fetch(&self, tasks: &mut JoinSet<Completion>, fetch: Fetch) {
        debug!(?fetch, "issuing fetch");
        let provider = Arc::clone(&self.provider);
        let address = self.address;
        let limit = self.config.fetch_timeout();

        tasks.spawn(async move {
            match fetch {
                Fetch::TokenType => {
                    Completion::TokenType(bounded(limit, provider.get_token_type(address)).await)
                }
                Fetch::Name => Completion::Name(bounded(limit, provider.get_name(address)).await),
                Fetch::Symbol => {
                    Completion::Symbol(bounded(limit, provider.get_symbol(address)).await)
                }
                Fetch::Decimals => {
                    Completion::Decimals(bounded(limit, provider.get_decimals(address)).await)
                }
                Fetch::Balance(token_type) => Completion::Balance(
                    token_type,
                    bounded(limit, provider.get_balance(address, token_type)).await,
                ),
            }
        });
    }
}

async fn bounded<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(FetchError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        }),
        None => fut.await,
    }
}

/// A query issued by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    TokenType,
    Name,
    Symbol,
    Decimals,
    Balance(TokenType),
}

/// Result of a finished fetch task.
#[derive(Debug)]
enum Completion {
    TokenType(Result<TokenType, FetchError>),
    Name(Result<String, FetchError>),
    Symbol(Result<String, FetchError>),
    Decimals(Result<u8, FetchError>),
    Balance(TokenType, Result<NonFungibleBalance, FetchError>),
}

#[derive(Debug, Default)]
enum Slot<T> {
    #[default]
    Pending,
    Ready(T),
    Failed(FetchError),
}

impl<T> Slot<T> {
    fn is_settled(&self) -> bool {
        !matches!(self, Slot::Pending)
    }

    fn value(&self) -> Option<&T> {
        match self {
            Slot::Ready(v) => Some(v),
            _ => None,
        }
    }

    fn error(&self) -> Option<&FetchError> {
        match self {
            Slot::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// What the coordinator should do after one completion.
#[derive(Debug, Default)]
struct Step {
    events: Vec<ContractData>,
    follow_up: Option<Fetch>,
}

/// Partial results of one detection. Only the coordinating task touches it.
#[derive(Debug, Default)]
struct Detection {
    token_type: Option<TokenType>,
    name: Slot<String>,
    symbol: Slot<String>,
    decimals: Option<u8>,
    balance: Option<NonFungibleBalance>,
    finished: bool,
}

impl Detection {
    fn apply(&mut self, completion: Completion, reachability: &dyn Reachability) -> Step {
        let mut step = Step::default();
        if self.finished {
            return step;
        }

        match completion {
            Completion::TokenType(Ok(token_type)) => {
                debug!(?token_type, "token type resolved");
                self.token_type = Some(token_type);
                match token_type {
                    TokenType::NativeCryptocurrency => self.decimals = Some(0),
                    TokenType::Erc20 => step.follow_up = Some(Fetch::Decimals),
                    TokenType::Erc875 | TokenType::Erc721 | TokenType::Erc721ForTickets => {
                        self.decimals = Some(0);
                        step.follow_up = Some(Fetch::Balance(token_type));
                    }
                    TokenType::Erc1155 => {
                        // No live balance query for ERC-1155; ids are not enumerable.
                        let balance = NonFungibleBalance::Balance(Vec::new());
                        self.decimals = Some(0);
                        self.balance = Some(balance.clone());
                        step.events.push(ContractData::Balance {
                            balance,
                            token_type,
                        });
                    }
                }
            }
            Completion::TokenType(Err(err)) => {
                warn!(error = %err, "token type fetch failed");
                return self.fail_into(step, reachability);
            }
            Completion::Name(Ok(name)) => {
                step.events.push(ContractData::Name(name.clone()));
                self.name = Slot::Ready(name);
            }
            Completion::Name(Err(err)) => {
                debug!(error = %err, "name fetch failed");
                self.name = Slot::Failed(err);
            }
            Completion::Symbol(Ok(symbol)) => {
                step.events.push(ContractData::Symbol(symbol.clone()));
                self.symbol = Slot::Ready(symbol);
            }
            Completion::Symbol(Err(err)) => {
                debug!(error = %err, "symbol fetch failed");
                self.symbol = Slot::Failed(err);
            }
            Completion::Decimals(Ok(decimals)) => {
                step.events.push(ContractData::Decimals(decimals));
                self.decimals = Some(decimals);
            }
            Completion::Decimals(Err(err)) => {
                warn!(error = %err, "decimals fetch failed");
                return self.fail_into(step, reachability);
            }
            Completion::Balance(token_type, Ok(balance)) => {
                debug!(?token_type, held = balance.held_count(), "balance resolved");
                step.events.push(ContractData::Balance {
                    balance: balance.clone(),
                    token_type,
                });
                self.balance = Some(balance);
            }
            Completion::Balance(token_type, Err(err)) => {
                warn!(?token_type, error = %err, "balance fetch failed");
                return self.fail_into(step, reachability);
            }
        }

        // Name and symbol failures are judged once the type is known, since
        // only some token standards require them.
        if let Some(token_type) = self.token_type {
            if token_type.should_have_name_and_symbol() {
                if let Some(err) = self.name.error().or_else(|| self.symbol.error()) {
                    warn!(?token_type, error = %err, "required name or symbol unavailable");
                    return self.fail_into(step, reachability);
                }
            }
        }

        if let Some(terminal) = self.terminal(reachability) {
            debug!(outcome = ?terminal, "detection complete");
            self.finished = true;
            step.events.push(terminal);
        }
        step
    }

    /// Terminal outcome once every fetch required for the resolved type has settled.
    fn terminal(&self, reachability: &dyn Reachability) -> Option<ContractData> {
        let token_type = self.token_type?;
        if !self.name.is_settled() || !self.symbol.is_settled() {
            return None;
        }

        if token_type.is_non_fungible() {
            let balance = self.balance.clone()?;
            return Some(ContractData::NonFungibleComplete {
                name: self.name.value().cloned().unwrap_or_default(),
                symbol: self.symbol.value().cloned().unwrap_or_default(),
                balance,
                token_type,
            });
        }

        let name = self.name.value()?;
        let symbol = self.symbol.value()?;
        let decimals = self.decimals?;
        if symbol.is_empty() {
            // An empty symbol is also what a node returns without connectivity.
            let network_reachable = reachability.is_reachable();
            return Some(if network_reachable == Some(true) {
                ContractData::DelegateComplete
            } else {
                ContractData::Failed { network_reachable }
            });
        }
        Some(ContractData::FungibleComplete {
            name: name.clone(),
            symbol: symbol.clone(),
            decimals,
        })
    }

    fn fail(&mut self, reachability: &dyn Reachability) -> Step {
        self.fail_into(Step::default(), reachability)
    }

    fn fail_into(&mut self, mut step: Step, reachability: &dyn Reachability) -> Step {
        step.follow_up = None;
        if !self.finished {
            self.finished = true;
            step.events.push(ContractData::Failed {
                network_reachable: reachability.is_reachable(),
            });
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::StaticReachability;

    fn rpc_err() -> FetchError {
        FetchError::Rpc("execution reverted".into())
    }

    #[test]
    fn test_name_before_type_is_reported_immediately() {
        let reach = StaticReachability::new(Some(true));
        let mut detection = Detection::default();
        let step = detection.apply(Completion::Name(Ok("Foo".into())), &reach);
        assert_eq!(step.events, vec![ContractData::Name("Foo".into())]);
        assert!(step.follow_up.is_none());
    }

    #[test]
    fn test_name_failure_waits_for_type() {
        let reach = StaticReachability::new(Some(true));
        let mut detection = Detection::default();
        let step = detection.apply(Completion::Name(Err(rpc_err())), &reach);
        assert!(step.events.is_empty());
        assert!(!detection.finished);

        let step = detection.apply(Completion::TokenType(Ok(TokenType::Erc20)), &reach);
        assert_eq!(
            step.events,
            vec![ContractData::Failed {
                network_reachable: Some(true)
            }]
        );
        assert!(step.follow_up.is_none());
        assert!(detection.finished);
    }

    #[test]
    fn test_symbol_failure_fails_required_type() {
        let reach = StaticReachability::new(Some(false));
        let mut detection = Detection::default();
        detection.apply(Completion::Name(Ok("Tickets".into())), &reach);
        detection.apply(Completion::Symbol(Err(rpc_err())), &reach);
        assert!(detection.symbol.error().is_some());
        assert!(detection.name.error().is_none());

        let step = detection.apply(Completion::TokenType(Ok(TokenType::Erc875)), &reach);
        assert_eq!(
            step.events,
            vec![ContractData::Failed {
                network_reachable: Some(false)
            }]
        );
        assert!(step.follow_up.is_none());
    }

    #[test]
    fn test_type_drives_follow_up() {
        let reach = StaticReachability::default();
        for (token_type, expected) in [
            (TokenType::Erc20, Some(Fetch::Decimals)),
            (TokenType::Erc875, Some(Fetch::Balance(TokenType::Erc875))),
            (TokenType::Erc721, Some(Fetch::Balance(TokenType::Erc721))),
            (
                TokenType::Erc721ForTickets,
                Some(Fetch::Balance(TokenType::Erc721ForTickets)),
            ),
            (TokenType::Erc1155, None),
            (TokenType::NativeCryptocurrency, None),
        ] {
            let mut detection = Detection::default();
            let step = detection.apply(Completion::TokenType(Ok(token_type)), &reach);
            assert_eq!(step.follow_up, expected, "{token_type:?}");
        }
    }

    #[test]
    fn test_erc1155_placeholder_balance() {
        let reach = StaticReachability::default();
        let mut detection = Detection::default();
        let step = detection.apply(Completion::TokenType(Ok(TokenType::Erc1155)), &reach);
        assert_eq!(
            step.events,
            vec![ContractData::Balance {
                balance: NonFungibleBalance::Balance(vec![]),
                token_type: TokenType::Erc1155,
            }]
        );

        detection.apply(Completion::Name(Err(rpc_err())), &reach);
        let step = detection.apply(Completion::Symbol(Ok("ENJ".into())), &reach);
        assert_eq!(
            step.events.last(),
            Some(&ContractData::NonFungibleComplete {
                name: String::new(),
                symbol: "ENJ".into(),
                balance: NonFungibleBalance::Balance(vec![]),
                token_type: TokenType::Erc1155,
            })
        );
    }

    #[test]
    fn test_failure_is_reported_once() {
        let reach = StaticReachability::new(Some(false));
        let mut detection = Detection::default();
        detection.apply(Completion::TokenType(Ok(TokenType::Erc20)), &reach);
        let first = detection.apply(Completion::Decimals(Err(rpc_err())), &reach);
        assert_eq!(
            first.events,
            vec![ContractData::Failed {
                network_reachable: Some(false)
            }]
        );

        let second = detection.apply(Completion::Name(Err(rpc_err())), &reach);
        assert!(second.events.is_empty());
        let third = detection.fail(&reach);
        assert!(third.events.is_empty());
    }

    #[test]
    fn test_native_currency_needs_no_decimals() {
        let reach = StaticReachability::default();
        let mut detection = Detection::default();
        detection.apply(Completion::Name(Ok("Ether".into())), &reach);
        detection.apply(Completion::Symbol(Ok("ETH".into())), &reach);
        let step = detection.apply(
            Completion::TokenType(Ok(TokenType::NativeCryptocurrency)),
            &reach,
        );
        assert_eq!(
            step.events,
            vec![ContractData::FungibleComplete {
                name: "Ether".into(),
                symbol: "ETH".into(),
                decimals: 0,
            }]
        );
    }

    #[test]
    fn test_empty_symbol_without_connectivity_fails() {
        let reach = StaticReachability::new(None);
        let mut detection = Detection::default();
        detection.apply(Completion::TokenType(Ok(TokenType::Erc20)), &reach);
        detection.apply(Completion::Name(Ok(String::new())), &reach);
        detection.apply(Completion::Decimals(Ok(18)), &reach);
        let step = detection.apply(Completion::Symbol(Ok(String::new())), &reach);
        assert_eq!(
            step.events.last(),
            Some(&ContractData::Failed {
                network_reachable: None
            })
        );
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<u8, FetchError> = bounded(Some(Duration::from_millis(5)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(result, Err(FetchError::Timeout { after_ms: 5 }));
    }

    #[tokio::test]
    async fn test_bounded_without_limit_passes_through() {
        let result: Result<u8, FetchError> = bounded(None, async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
