//! Contract view calls.
//!
//! This module defines the `ContractAccessor` trait, the read-only seam
//! between handlers and chain state. Every call is pinned to the chain and
//! block of the event being handled. Typed bindings per contract sit on top so
//! handlers never build [`ViewCall`]s by hand.

mod recorded;

pub use recorded::{CallOutcome, DecayRecording, Fixture, RecordedAccessor, Recording};

use std::fmt;

use async_trait::async_trait;
use garden_store::{Address, Amount, ProposalStatus};
use serde::{Deserialize, Serialize};

/// Chain and block a call is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallAt {
    pub chain_id: u64,
    pub block_number: u64,
}

/// Error types for contract reads.
#[derive(Debug, thiserror::Error)]
pub enum AccessorError {
    /// The contract reverted
    #[error("Call reverted: {call}: {reason}")]
    Reverted { call: String, reason: String },

    /// No result is available for this call
    #[error("No result for {call} at block {block}")]
    Missing { call: String, block: u64 },

    /// The call returned a value of the wrong shape
    #[error("Unexpected value for {call}: expected {expected}")]
    UnexpectedValue { call: String, expected: &'static str },

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum ViewCall {
    #[serde(rename = "gardenToken")]
    GardenToken { community: Address },
    #[serde(rename = "covenantIpfsHash")]
    CovenantIpfsHash { community: Address },
    #[serde(rename = "registerStakeAmount")]
    RegisterStakeAmount { community: Address },
    #[serde(rename = "councilSafe")]
    CouncilSafe { community: Address },
    #[serde(rename = "allo")]
    Allo { community: Address },
    #[serde(rename = "isKickEnabled")]
    IsKickEnabled { community: Address },
    #[serde(rename = "communityFee")]
    CommunityFee { community: Address },
    #[serde(rename = "strategyTemplate")]
    StrategyTemplate { community: Address },
    #[serde(rename = "registryFactory")]
    RegistryFactory { community: Address },
    #[serde(rename = "getProtocolFee")]
    ProtocolFee { factory: Address, community: Address },
    #[serde(rename = "balanceOf")]
    BalanceOf { token: Address, owner: Address },
    #[serde(rename = "decimals")]
    Decimals { token: Address },
    #[serde(rename = "symbol")]
    Symbol { token: Address },
    #[serde(rename = "name")]
    Name { token: Address },
    #[serde(rename = "totalEffectiveActivePoints")]
    TotalEffectiveActivePoints { strategy: Address },
    #[serde(rename = "getMaxConviction")]
    MaxConviction { strategy: Address, points: Amount },
    #[serde(rename = "getAllo")]
    StrategyAllo { strategy: Address },
    #[serde(rename = "getPoolAmount")]
    PoolAmount { strategy: Address },
    #[serde(rename = "getProposal")]
    Proposal { strategy: Address, proposal_id: Amount },
    #[serde(rename = "getPool")]
    AlloPoolToken { allo: Address, pool_id: Amount },
}

impl ViewCall {
    /// Solidity method name.
    pub fn method(&self) -> &'static str {
        match self {
            ViewCall::GardenToken { .. } => "gardenToken",
            ViewCall::CovenantIpfsHash { .. } => "covenantIpfsHash",
            ViewCall::RegisterStakeAmount { .. } => "registerStakeAmount",
            ViewCall::CouncilSafe { .. } => "councilSafe",
            ViewCall::Allo { .. } => "allo",
            ViewCall::IsKickEnabled { .. } => "isKickEnabled",
            ViewCall::CommunityFee { .. } => "communityFee",
            ViewCall::StrategyTemplate { .. } => "strategyTemplate",
            ViewCall::RegistryFactory { .. } => "registryFactory",
            ViewCall::ProtocolFee { .. } => "getProtocolFee",
            ViewCall::BalanceOf { .. } => "balanceOf",
            ViewCall::Decimals { .. } => "decimals",
            ViewCall::Symbol { .. } => "symbol",
            ViewCall::Name { .. } => "name",
            ViewCall::TotalEffectiveActivePoints { .. } => "totalEffectiveActivePoints",
            ViewCall::MaxConviction { .. } => "getMaxConviction",
            ViewCall::StrategyAllo { .. } => "getAllo",
            ViewCall::PoolAmount { .. } => "getPoolAmount",
            ViewCall::Proposal { .. } => "getProposal",
            ViewCall::AlloPoolToken { .. } => "getPool",
        }
    }

    /// Contract the call is made against.
    pub fn target(&self) -> &Address {
        match self {
            ViewCall::GardenToken { community }
            | ViewCall::CovenantIpfsHash { community }
            | ViewCall::RegisterStakeAmount { community }
            | ViewCall::CouncilSafe { community }
            | ViewCall::Allo { community }
            | ViewCall::IsKickEnabled { community }
            | ViewCall::CommunityFee { community }
            | ViewCall::StrategyTemplate { community }
            | ViewCall::RegistryFactory { community } => community,
            ViewCall::ProtocolFee { factory, .. } => factory,
            ViewCall::BalanceOf { token, .. }
            | ViewCall::Decimals { token }
            | ViewCall::Symbol { token }
            | ViewCall::Name { token } => token,
            ViewCall::TotalEffectiveActivePoints { strategy }
            | ViewCall::MaxConviction { strategy, .. }
            | ViewCall::StrategyAllo { strategy }
            | ViewCall::PoolAmount { strategy }
            | ViewCall::Proposal { strategy, .. } => strategy,
            ViewCall::AlloPoolToken { allo, .. } => allo,
        }
    }
}

impl fmt::Display for ViewCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target(), self.method())
    }
}

/// Proposal state as returned by `getProposal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalView {
    pub submitter: Address,
    pub beneficiary: Address,
    pub requested_token: Address,
    pub requested_amount: Amount,
    pub staked_amount: Amount,
    pub proposal_status: ProposalStatus,
    pub block_last: u64,
    pub conviction_last: Amount,
    pub threshold: Amount,
    pub arbitrable_config_version: Amount,
}

/// A decoded return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewValue {
    Address(Address),
    Amount(Amount),
    Bool(bool),
    Text(String),
    Uint8(u8),
    Proposal(ProposalView),
}

/// Read-only access to contract state.
#[async_trait]
pub trait ContractAccessor: Send + Sync {
    /// Evaluate a view call at the given chain and block.
    async fn call(&self, at: CallAt, call: &ViewCall) -> Result<ViewValue, AccessorError>;
}

macro_rules! decode {
    ($fn:ident, $variant:ident, $ty:ty, $expected:literal) => {
        async fn $fn(&self, call: ViewCall) -> Result<$ty, AccessorError> {
            match self.accessor.call(self.at, &call).await? {
                ViewValue::$variant(value) => Ok(value),
                _ => Err(AccessorError::UnexpectedValue {
                    call: call.to_string(),
                    expected: $expected,
                }),
            }
        }
    };
}

/// Shared decoding for the typed bindings below.
struct Binding<'a> {
    accessor: &'a dyn ContractAccessor,
    at: CallAt,
}

impl Binding<'_> {
    decode!(address, Address, Address, "address");
    decode!(amount, Amount, Amount, "uint256");
    decode!(boolean, Bool, bool, "bool");
    decode!(text, Text, String, "string");
    decode!(uint8, Uint8, u8, "uint8");
    decode!(proposal, Proposal, ProposalView, "proposal");
}

/// Registry community contract.
pub struct CommunityContract<'a> {
    binding: Binding<'a>,
    address: Address,
}

impl<'a> CommunityContract<'a> {
    pub fn bind(accessor: &'a dyn ContractAccessor, at: CallAt, address: &Address) -> Self {
        Self {
            binding: Binding { accessor, at },
            address: address.clone(),
        }
    }

    fn community(&self) -> Address {
        self.address.clone()
    }

    pub async fn garden_token(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::GardenToken { community: self.community() }).await
    }

    pub async fn covenant_ipfs_hash(&self) -> Result<String, AccessorError> {
        self.binding.text(ViewCall::CovenantIpfsHash { community: self.community() }).await
    }

    pub async fn register_stake_amount(&self) -> Result<Amount, AccessorError> {
        self.binding.amount(ViewCall::RegisterStakeAmount { community: self.community() }).await
    }

    pub async fn council_safe(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::CouncilSafe { community: self.community() }).await
    }

    pub async fn allo(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::Allo { community: self.community() }).await
    }

    pub async fn is_kick_enabled(&self) -> Result<bool, AccessorError> {
        self.binding.boolean(ViewCall::IsKickEnabled { community: self.community() }).await
    }

    pub async fn community_fee(&self) -> Result<Amount, AccessorError> {
        self.binding.amount(ViewCall::CommunityFee { community: self.community() }).await
    }

    pub async fn strategy_template(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::StrategyTemplate { community: self.community() }).await
    }

    pub async fn registry_factory(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::RegistryFactory { community: self.community() }).await
    }
}

/// Registry factory contract.
pub struct FactoryContract<'a> {
    binding: Binding<'a>,
    address: Address,
}

impl<'a> FactoryContract<'a> {
    pub fn bind(accessor: &'a dyn ContractAccessor, at: CallAt, address: &Address) -> Self {
        Self {
            binding: Binding { accessor, at },
            address: address.clone(),
        }
    }

    pub async fn protocol_fee(&self, community: &Address) -> Result<Amount, AccessorError> {
        self.binding
            .amount(ViewCall::ProtocolFee {
                factory: self.address.clone(),
                community: community.clone(),
            })
            .await
    }
}

/// ERC-20 token contract.
pub struct Erc20Contract<'a> {
    binding: Binding<'a>,
    address: Address,
}

impl<'a> Erc20Contract<'a> {
    pub fn bind(accessor: &'a dyn ContractAccessor, at: CallAt, address: &Address) -> Self {
        Self {
            binding: Binding { accessor, at },
            address: address.clone(),
        }
    }

    pub async fn balance_of(&self, owner: &Address) -> Result<Amount, AccessorError> {
        self.binding
            .amount(ViewCall::BalanceOf {
                token: self.address.clone(),
                owner: owner.clone(),
            })
            .await
    }

    pub async fn decimals(&self) -> Result<u8, AccessorError> {
        self.binding.uint8(ViewCall::Decimals { token: self.address.clone() }).await
    }

    pub async fn symbol(&self) -> Result<String, AccessorError> {
        self.binding.text(ViewCall::Symbol { token: self.address.clone() }).await
    }

    pub async fn name(&self) -> Result<String, AccessorError> {
        self.binding.text(ViewCall::Name { token: self.address.clone() }).await
    }
}

/// Conviction-voting strategy contract, plus the Allo pool lookup it needs.
pub struct StrategyContract<'a> {
    binding: Binding<'a>,
    address: Address,
}

impl<'a> StrategyContract<'a> {
    pub fn bind(accessor: &'a dyn ContractAccessor, at: CallAt, address: &Address) -> Self {
        Self {
            binding: Binding { accessor, at },
            address: address.clone(),
        }
    }

    fn strategy(&self) -> Address {
        self.address.clone()
    }

    pub async fn total_effective_active_points(&self) -> Result<Amount, AccessorError> {
        self.binding
            .amount(ViewCall::TotalEffectiveActivePoints { strategy: self.strategy() })
            .await
    }

    pub async fn max_conviction(&self, points: &Amount) -> Result<Amount, AccessorError> {
        self.binding
            .amount(ViewCall::MaxConviction {
                strategy: self.strategy(),
                points: points.clone(),
            })
            .await
    }

    pub async fn allo(&self) -> Result<Address, AccessorError> {
        self.binding.address(ViewCall::StrategyAllo { strategy: self.strategy() }).await
    }

    pub async fn pool_amount(&self) -> Result<Amount, AccessorError> {
        self.binding.amount(ViewCall::PoolAmount { strategy: self.strategy() }).await
    }

    pub async fn proposal(&self, proposal_id: &Amount) -> Result<ProposalView, AccessorError> {
        self.binding
            .proposal(ViewCall::Proposal {
                strategy: self.strategy(),
                proposal_id: proposal_id.clone(),
            })
            .await
    }

    /// Token of an Allo pool.
    pub async fn pool_token(&self, allo: &Address, pool_id: &Amount) -> Result<Address, AccessorError> {
        self.binding
            .address(ViewCall::AlloPoolToken {
                allo: allo.clone(),
                pool_id: pool_id.clone(),
            })
            .await
    }
}
