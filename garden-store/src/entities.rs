//! Typed entity records.
//!
//! One struct per entity kind. Fields serialise in camelCase because those are
//! the names clients filter and sort on. Only fields the domain allows to be
//! absent are `Option`.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Amount;
use crate::error::StoreError;
use crate::member_set::MemberSet;

/// Native-token sentinel used by Allo.
pub const TOKEN_NATIVE: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// One partition per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    RegistryFactory,
    RegistryCommunity,
    TokenGarden,
    Member,
    MemberCommunity,
    CVStrategy,
    CVStrategyConfig,
    ArbitrableConfig,
    MemberStrategy,
    Allo,
    CVProposal,
    Stake,
    ProposalDispute,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        EntityKind::RegistryFactory,
        EntityKind::RegistryCommunity,
        EntityKind::TokenGarden,
        EntityKind::Member,
        EntityKind::MemberCommunity,
        EntityKind::CVStrategy,
        EntityKind::CVStrategyConfig,
        EntityKind::ArbitrableConfig,
        EntityKind::MemberStrategy,
        EntityKind::Allo,
        EntityKind::CVProposal,
        EntityKind::Stake,
        EntityKind::ProposalDispute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::RegistryFactory => "RegistryFactory",
            EntityKind::RegistryCommunity => "RegistryCommunity",
            EntityKind::TokenGarden => "TokenGarden",
            EntityKind::Member => "Member",
            EntityKind::MemberCommunity => "MemberCommunity",
            EntityKind::CVStrategy => "CVStrategy",
            EntityKind::CVStrategyConfig => "CVStrategyConfig",
            EntityKind::ArbitrableConfig => "ArbitrableConfig",
            EntityKind::MemberStrategy => "MemberStrategy",
            EntityKind::Allo => "Allo",
            EntityKind::CVProposal => "CVProposal",
            EntityKind::Stake => "Stake",
            EntityKind::ProposalDispute => "ProposalDispute",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::UnknownKind(s.to_string()))
    }
}

/// A record that lives in exactly one store partition.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ty, $kind:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

// ============================================================================
// Enum-like integers
// ============================================================================

/// How a strategy accounts member points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PointSystem {
    /// Every member gets the same fixed amount; tracked per member.
    Fixed = 0,
    Capped = 1,
    Unlimited = 2,
    Quadratic = 3,
}

impl TryFrom<u8> for PointSystem {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PointSystem::Fixed),
            1 => Ok(PointSystem::Capped),
            2 => Ok(PointSystem::Unlimited),
            3 => Ok(PointSystem::Quadratic),
            other => Err(format!("unknown point system: {}", other)),
        }
    }
}

impl From<PointSystem> for u8 {
    fn from(value: PointSystem) -> u8 {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProposalType {
    Signaling = 0,
    Funding = 1,
    Streaming = 2,
}

impl TryFrom<u8> for ProposalType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProposalType::Signaling),
            1 => Ok(ProposalType::Funding),
            2 => Ok(ProposalType::Streaming),
            other => Err(format!("unknown proposal type: {}", other)),
        }
    }
}

impl From<ProposalType> for u8 {
    fn from(value: ProposalType) -> u8 {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProposalStatus {
    Inactive = 0,
    Active = 1,
    Paused = 2,
    Cancelled = 3,
    Executed = 4,
    Disputed = 5,
    Rejected = 6,
}

impl TryFrom<u8> for ProposalStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProposalStatus::Inactive),
            1 => Ok(ProposalStatus::Active),
            2 => Ok(ProposalStatus::Paused),
            3 => Ok(ProposalStatus::Cancelled),
            4 => Ok(ProposalStatus::Executed),
            5 => Ok(ProposalStatus::Disputed),
            6 => Ok(ProposalStatus::Rejected),
            other => Err(format!("unknown proposal status: {}", other)),
        }
    }
}

impl From<ProposalStatus> for u8 {
    fn from(value: ProposalStatus) -> u8 {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DisputeStatus {
    Waiting = 0,
    Solved = 1,
}

impl TryFrom<u8> for DisputeStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisputeStatus::Waiting),
            1 => Ok(DisputeStatus::Solved),
            other => Err(format!("unknown dispute status: {}", other)),
        }
    }
}

impl From<DisputeStatus> for u8 {
    fn from(value: DisputeStatus) -> u8 {
        value as u8
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFactory {
    pub id: String,
    pub chain_id: u64,
}

entity!(RegistryFactory, EntityKind::RegistryFactory);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCommunity {
    pub id: String,
    pub chain_id: u64,
    pub community_name: String,
    pub profile_id: String,
    pub covenant_ipfs_hash: String,
    pub register_stake_amount: Amount,
    pub council_safe: Address,
    pub pending_new_council_safe: Option<Address>,
    pub allo_address: Address,
    pub is_kick_enabled: bool,
    pub community_fee: Amount,
    pub protocol_fee: Amount,
    pub protocol_fee_receiver: Option<Address>,
    pub register_token: Address,
    pub registry_factory: Address,
    pub strategy_template: Address,
    pub is_valid: bool,
    pub archived: bool,
    pub members_count: u64,
    /// Id of the `TokenGarden` for `register_token`.
    pub garden: String,
}

entity!(RegistryCommunity, EntityKind::RegistryCommunity);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGarden {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Cached `balanceOf` of the last community that touched this token.
    pub total_balance: Amount,
    pub chain_id: u64,
    pub ipfs_covenant: Option<String>,
}

entity!(TokenGarden, EntityKind::TokenGarden);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allo {
    pub id: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    #[serde(rename = "tokenNative")]
    pub token_native: String,
}

entity!(Allo, EntityKind::Allo);

// ============================================================================
// Membership
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
}

entity!(Member, EntityKind::Member);

impl Member {
    pub fn new(address: &Address) -> Self {
        Self { id: address.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCommunity {
    pub id: String,
    pub member: String,
    pub registry_community: String,
    pub staked_tokens: Amount,
    pub is_registered: bool,
    pub covenant_signature: Option<String>,
}

entity!(MemberCommunity, EntityKind::MemberCommunity);

impl MemberCommunity {
    pub fn id_for(member: &Address, community: &Address) -> String {
        format!("{}-{}", member, community)
    }

    pub fn new(member: &Address, community: &Address) -> Self {
        Self {
            id: Self::id_for(member, community),
            member: member.to_string(),
            registry_community: community.to_string(),
            staked_tokens: Amount::zero(),
            is_registered: false,
            covenant_signature: None,
        }
    }
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CVStrategy {
    pub id: String,
    pub pool_id: Amount,
    pub registry_community: String,
    /// Id of the `CVStrategyConfig`.
    pub config: String,
    pub token: Address,
    pub pool_amount: Amount,
    pub is_enabled: bool,
    pub archived: bool,
    pub total_effective_active_points: Amount,
    #[serde(rename = "maxCVSupply")]
    pub max_cv_supply: Amount,
    pub member_active: MemberSet,
    pub metadata_hash: Option<String>,
}

entity!(CVStrategy, EntityKind::CVStrategy);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CVStrategyConfig {
    pub id: String,
    pub strategy: String,
    pub point_system: PointSystem,
    pub proposal_type: ProposalType,
    pub max_amount: Amount,
    pub decay: Amount,
    pub max_ratio: Amount,
    pub weight: Amount,
    pub min_threshold_points: Amount,
    pub allowlist: MemberSet,
}

entity!(CVStrategyConfig, EntityKind::CVStrategyConfig);

impl CVStrategyConfig {
    pub fn id_for(strategy: &Address, pool_id: &Amount) -> String {
        format!("{}-{}-config", strategy, pool_id)
    }
}

/// One version of a strategy's dispute settings. Every update adds a version;
/// proposals keep pointing at the version they were created under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrableConfig {
    pub id: String,
    pub version: Amount,
    pub strategy: String,
    pub arbitrator: Address,
    pub tribunal_safe: Address,
    pub submitter_collateral_amount: Amount,
    pub challenger_collateral_amount: Amount,
    pub default_ruling: Amount,
    pub default_ruling_timeout: Amount,
}

entity!(ArbitrableConfig, EntityKind::ArbitrableConfig);

impl ArbitrableConfig {
    pub fn id_for(strategy: &Address, version: &Amount) -> String {
        format!("{}-{}", strategy, version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStrategy {
    pub id: String,
    pub member: String,
    pub strategy: String,
    pub total_staked_points: Amount,
    pub activated_points: Amount,
}

entity!(MemberStrategy, EntityKind::MemberStrategy);

impl MemberStrategy {
    pub fn id_for(member: &Address, strategy: &Address) -> String {
        format!("{}-{}", member, strategy)
    }

    pub fn new(member: &Address, strategy: &Address) -> Self {
        Self {
            id: Self::id_for(member, strategy),
            member: member.to_string(),
            strategy: strategy.to_string(),
            total_staked_points: Amount::zero(),
            activated_points: Amount::zero(),
        }
    }
}

// ============================================================================
// Proposals
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CVProposal {
    pub id: String,
    pub strategy: String,
    pub proposal_number: Amount,
    pub beneficiary: Address,
    pub requested_token: Address,
    pub requested_amount: Amount,
    pub staked_amount: Amount,
    pub conviction_last: Amount,
    pub block_last: u64,
    pub threshold: Amount,
    #[serde(rename = "maxCVStaked")]
    pub max_cv_staked: Amount,
    pub proposal_status: ProposalStatus,
    pub submitter: Address,
    /// Id of the `ArbitrableConfig` in force when the proposal was created.
    pub arbitrable_config: String,
    pub created_at: u64,
    pub updated_at: u64,
}

entity!(CVProposal, EntityKind::CVProposal);

impl CVProposal {
    pub fn id_for(strategy: &Address, proposal_number: &Amount) -> String {
        format!("{}-{}", strategy, proposal_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub id: String,
    pub member: String,
    pub proposal: String,
    pub pool_id: Amount,
    pub amount: Amount,
    pub created_at: u64,
}

entity!(Stake, EntityKind::Stake);

impl Stake {
    /// Stakes of one member on one strategy share [`Stake::prefix_for`].
    pub fn id_for(member: &Address, strategy: &Address, proposal_number: &Amount) -> String {
        format!("{}{}", Self::prefix_for(member, strategy), proposal_number)
    }

    pub fn prefix_for(member: &Address, strategy: &Address) -> String {
        format!("{}-", MemberStrategy::id_for(member, strategy))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDispute {
    pub id: String,
    pub dispute_id: Amount,
    pub proposal: String,
    pub challenger: Address,
    pub context: String,
    pub status: DisputeStatus,
    pub created_at: u64,
    pub ruled_at: Option<u64>,
    pub ruling_outcome: Option<Amount>,
}

entity!(ProposalDispute, EntityKind::ProposalDispute);

impl ProposalDispute {
    pub fn id_for(arbitrator: &Address, dispute_id: &Amount) -> String {
        format!("{}_{}", arbitrator, dispute_id)
    }
}
