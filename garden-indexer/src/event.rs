//! Decoded chain events.
//!
//! On the wire an event is one JSON object: the log position fields plus
//! `kind` (the event name) and `params` (its decoded arguments). Addresses are
//! validated and lower-cased while decoding.

use std::fmt;

use garden_store::{Address, Amount, EventPosition, PointSystem, ProposalType, SourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub chain_id: u64,
    /// Contract that emitted the log.
    pub source: Address,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub block_timestamp: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Conviction parameters as emitted by strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvParams {
    pub max_ratio: Amount,
    pub weight: Amount,
    pub decay: Amount,
    pub min_threshold_points: Amount,
}

/// Initialization data of a conviction-voting strategy.
///
/// `initial_allowlist` only exists in the second initializer version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInitData {
    pub registry_community: Address,
    pub proposal_type: ProposalType,
    pub point_system: PointSystem,
    pub max_amount: Amount,
    pub cv_params: CvParams,
    #[serde(default)]
    pub initial_allowlist: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all_fields = "camelCase")]
pub enum EventPayload {
    // Registry factory
    CommunityCreated {
        registry_community: Address,
    },
    ProtocolFeeSet {
        community: Address,
        fee: Amount,
    },
    CommunityValiditySet {
        community: Address,
        is_valid: bool,
    },

    // Registry community
    RegistryInitialized {
        profile_id: String,
        community_name: String,
    },
    MemberRegistered {
        member: Address,
        amount_staked: Amount,
    },
    MemberRegisteredWithCovenant {
        member: Address,
        amount_staked: Amount,
        covenant_sig: String,
    },
    MemberUnregistered {
        member: Address,
        amount_unstaked: Amount,
    },
    MemberKicked {
        member: Address,
        transferred_to: Address,
        amount_unstaked: Amount,
    },
    StrategyAdded {
        strategy: Address,
    },
    StrategyRemoved {
        strategy: Address,
    },
    PoolCreated {
        pool_id: Amount,
        strategy: Address,
        community: Address,
        token: Address,
        #[serde(default)]
        metadata_pointer: String,
    },
    PoolRejected {
        strategy: Address,
    },
    MemberActivatedStrategy {
        member: Address,
        strategy: Address,
        points_to_increase: Amount,
    },
    MemberDeactivatedStrategy {
        member: Address,
        strategy: Address,
    },
    MemberPowerIncreased {
        member: Address,
        staked_amount: Amount,
    },
    MemberPowerDecreased {
        member: Address,
        unstaked_amount: Amount,
    },
    CommunityNameUpdated {
        community_name: String,
    },
    CovenantIpfsHashUpdated {
        covenant_ipfs_hash: String,
    },
    KickEnabledUpdated {
        is_kick_enabled: bool,
    },
    CouncilSafeChangeStarted {
        pending_council_safe: Address,
    },
    CouncilSafeUpdated {
        council_safe: Address,
    },
    BasisStakedAmountUpdated {
        register_stake_amount: Amount,
    },
    CommunityFeeUpdated {
        community_fee: Amount,
    },
    FeeReceiverChanged {
        fee_receiver: Address,
    },
    CommunityArchived {
        archived: bool,
    },

    // Conviction-voting strategy
    InitializedCV {
        pool_id: Amount,
        data: StrategyInitData,
    },
    InitializedCV2 {
        pool_id: Amount,
        data: StrategyInitData,
    },
    PowerIncreased {
        member: Address,
        tokens_staked: Amount,
        points_to_increase: Amount,
    },
    PowerDecreased {
        member: Address,
        tokens_unstaked: Amount,
        points_to_decrease: Amount,
    },
    CVParamsUpdated {
        cv_params: CvParams,
    },
    ArbitrableConfigUpdated {
        current_arbitrable_config_version: Amount,
        arbitrator: Address,
        tribunal_safe: Address,
        submitter_collateral_amount: Amount,
        challenger_collateral_amount: Amount,
        default_ruling: Amount,
        default_ruling_timeout: Amount,
    },
    PoolAmountIncreased {
        amount: Amount,
    },
    ProposalCreated {
        pool_id: Amount,
        proposal_id: Amount,
    },
    SupportAdded {
        from: Address,
        proposal_id: Amount,
        amount: Amount,
        total_staked_amount: Amount,
        conviction_last: Amount,
    },
    PointsDeactivated {
        member: Address,
    },
    Distributed {
        proposal_id: Amount,
        beneficiary: Address,
        amount: Amount,
    },
    ProposalCancelled {
        proposal_id: Amount,
    },
    ProposalDisputed {
        arbitrator: Address,
        proposal_id: Amount,
        dispute_id: Amount,
        challenger: Address,
        context: String,
    },
    Ruling {
        arbitrator: Address,
        dispute_id: Amount,
        ruling: Amount,
    },
    AllowlistMembersAdded {
        pool_id: Amount,
        members: Vec<Address>,
    },
    AllowlistMembersRemoved {
        pool_id: Amount,
        members: Vec<Address>,
    },
}

/// Payload discriminant, used for routing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CommunityCreated,
    ProtocolFeeSet,
    CommunityValiditySet,
    RegistryInitialized,
    MemberRegistered,
    MemberRegisteredWithCovenant,
    MemberUnregistered,
    MemberKicked,
    StrategyAdded,
    StrategyRemoved,
    PoolCreated,
    PoolRejected,
    MemberActivatedStrategy,
    MemberDeactivatedStrategy,
    MemberPowerIncreased,
    MemberPowerDecreased,
    CommunityNameUpdated,
    CovenantIpfsHashUpdated,
    KickEnabledUpdated,
    CouncilSafeChangeStarted,
    CouncilSafeUpdated,
    BasisStakedAmountUpdated,
    CommunityFeeUpdated,
    FeeReceiverChanged,
    CommunityArchived,
    InitializedCV,
    InitializedCV2,
    PowerIncreased,
    PowerDecreased,
    CVParamsUpdated,
    ArbitrableConfigUpdated,
    PoolAmountIncreased,
    ProposalCreated,
    SupportAdded,
    PointsDeactivated,
    Distributed,
    ProposalCancelled,
    ProposalDisputed,
    Ruling,
    AllowlistMembersAdded,
    AllowlistMembersRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 41] = [
        EventKind::CommunityCreated,
        EventKind::ProtocolFeeSet,
        EventKind::CommunityValiditySet,
        EventKind::RegistryInitialized,
        EventKind::MemberRegistered,
        EventKind::MemberRegisteredWithCovenant,
        EventKind::MemberUnregistered,
        EventKind::MemberKicked,
        EventKind::StrategyAdded,
        EventKind::StrategyRemoved,
        EventKind::PoolCreated,
        EventKind::PoolRejected,
        EventKind::MemberActivatedStrategy,
        EventKind::MemberDeactivatedStrategy,
        EventKind::MemberPowerIncreased,
        EventKind::MemberPowerDecreased,
        EventKind::CommunityNameUpdated,
        EventKind::CovenantIpfsHashUpdated,
        EventKind::KickEnabledUpdated,
        EventKind::CouncilSafeChangeStarted,
        EventKind::CouncilSafeUpdated,
        EventKind::BasisStakedAmountUpdated,
        EventKind::CommunityFeeUpdated,
        EventKind::FeeReceiverChanged,
        EventKind::CommunityArchived,
        EventKind::InitializedCV,
        EventKind::InitializedCV2,
        EventKind::PowerIncreased,
        EventKind::PowerDecreased,
        EventKind::CVParamsUpdated,
        EventKind::ArbitrableConfigUpdated,
        EventKind::PoolAmountIncreased,
        EventKind::ProposalCreated,
        EventKind::SupportAdded,
        EventKind::PointsDeactivated,
        EventKind::Distributed,
        EventKind::ProposalCancelled,
        EventKind::ProposalDisputed,
        EventKind::Ruling,
        EventKind::AllowlistMembersAdded,
        EventKind::AllowlistMembersRemoved,
    ];

    /// The kind of contract that emits this event.
    pub fn scope(&self) -> SourceKind {
        use EventKind::*;
        match self {
            CommunityCreated | ProtocolFeeSet | CommunityValiditySet => SourceKind::Factory,
            RegistryInitialized
            | MemberRegistered
            | MemberRegisteredWithCovenant
            | MemberUnregistered
            | MemberKicked
            | StrategyAdded
            | StrategyRemoved
            | PoolCreated
            | PoolRejected
            | MemberActivatedStrategy
            | MemberDeactivatedStrategy
            | MemberPowerIncreased
            | MemberPowerDecreased
            | CommunityNameUpdated
            | CovenantIpfsHashUpdated
            | KickEnabledUpdated
            | CouncilSafeChangeStarted
            | CouncilSafeUpdated
            | BasisStakedAmountUpdated
            | CommunityFeeUpdated
            | FeeReceiverChanged
            | CommunityArchived => SourceKind::Community,
            InitializedCV
            | InitializedCV2
            | PowerIncreased
            | PowerDecreased
            | CVParamsUpdated
            | ArbitrableConfigUpdated
            | PoolAmountIncreased
            | ProposalCreated
            | SupportAdded
            | PointsDeactivated
            | Distributed
            | ProposalCancelled
            | ProposalDisputed
            | Ruling
            | AllowlistMembersAdded
            | AllowlistMembersRemoved => SourceKind::Strategy,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::CommunityCreated { .. } => EventKind::CommunityCreated,
            EventPayload::ProtocolFeeSet { .. } => EventKind::ProtocolFeeSet,
            EventPayload::CommunityValiditySet { .. } => EventKind::CommunityValiditySet,
            EventPayload::RegistryInitialized { .. } => EventKind::RegistryInitialized,
            EventPayload::MemberRegistered { .. } => EventKind::MemberRegistered,
            EventPayload::MemberRegisteredWithCovenant { .. } => EventKind::MemberRegisteredWithCovenant,
            EventPayload::MemberUnregistered { .. } => EventKind::MemberUnregistered,
            EventPayload::MemberKicked { .. } => EventKind::MemberKicked,
            EventPayload::StrategyAdded { .. } => EventKind::StrategyAdded,
            EventPayload::StrategyRemoved { .. } => EventKind::StrategyRemoved,
            EventPayload::PoolCreated { .. } => EventKind::PoolCreated,
            EventPayload::PoolRejected { .. } => EventKind::PoolRejected,
            EventPayload::MemberActivatedStrategy { .. } => EventKind::MemberActivatedStrategy,
            EventPayload::MemberDeactivatedStrategy { .. } => EventKind::MemberDeactivatedStrategy,
            EventPayload::MemberPowerIncreased { .. } => EventKind::MemberPowerIncreased,
            EventPayload::MemberPowerDecreased { .. } => EventKind::MemberPowerDecreased,
            EventPayload::CommunityNameUpdated { .. } => EventKind::CommunityNameUpdated,
            EventPayload::CovenantIpfsHashUpdated { .. } => EventKind::CovenantIpfsHashUpdated,
            EventPayload::KickEnabledUpdated { .. } => EventKind::KickEnabledUpdated,
            EventPayload::CouncilSafeChangeStarted { .. } => EventKind::CouncilSafeChangeStarted,
            EventPayload::CouncilSafeUpdated { .. } => EventKind::CouncilSafeUpdated,
            EventPayload::BasisStakedAmountUpdated { .. } => EventKind::BasisStakedAmountUpdated,
            EventPayload::CommunityFeeUpdated { .. } => EventKind::CommunityFeeUpdated,
            EventPayload::FeeReceiverChanged { .. } => EventKind::FeeReceiverChanged,
            EventPayload::CommunityArchived { .. } => EventKind::CommunityArchived,
            EventPayload::InitializedCV { .. } => EventKind::InitializedCV,
            EventPayload::InitializedCV2 { .. } => EventKind::InitializedCV2,
            EventPayload::PowerIncreased { .. } => EventKind::PowerIncreased,
            EventPayload::PowerDecreased { .. } => EventKind::PowerDecreased,
            EventPayload::CVParamsUpdated { .. } => EventKind::CVParamsUpdated,
            EventPayload::ArbitrableConfigUpdated { .. } => EventKind::ArbitrableConfigUpdated,
            EventPayload::PoolAmountIncreased { .. } => EventKind::PoolAmountIncreased,
            EventPayload::ProposalCreated { .. } => EventKind::ProposalCreated,
            EventPayload::SupportAdded { .. } => EventKind::SupportAdded,
            EventPayload::PointsDeactivated { .. } => EventKind::PointsDeactivated,
            EventPayload::Distributed { .. } => EventKind::Distributed,
            EventPayload::ProposalCancelled { .. } => EventKind::ProposalCancelled,
            EventPayload::ProposalDisputed { .. } => EventKind::ProposalDisputed,
            EventPayload::Ruling { .. } => EventKind::Ruling,
            EventPayload::AllowlistMembersAdded { .. } => EventKind::AllowlistMembersAdded,
            EventPayload::AllowlistMembersRemoved { .. } => EventKind::AllowlistMembersRemoved,
        }
    }
}
