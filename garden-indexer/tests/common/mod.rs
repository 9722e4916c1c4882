//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use garden_indexer::event::{CvParams, StrategyInitData};
use garden_indexer::{ChainConfig, ChainEvent, EventPayload, Outcome, RecordedAccessor, Router, ViewCall, ViewValue};
use garden_store::{
    Address, Amount, Entity, EntityStore, EntityStoreExt, MemoryStore, PointSystem, ProposalType,
};

pub const CHAIN: u64 = 42161;
pub const POOL_ID: u64 = 1;
pub const DECAY: u64 = 9_999_799;

pub fn addr(last: u8) -> Address {
    Address::parse(&format!("0x{:040x}", last)).unwrap()
}

pub fn factory() -> Address {
    addr(0xfa)
}

pub fn community() -> Address {
    addr(0xc1)
}

pub fn token() -> Address {
    addr(0x70)
}

pub fn allo() -> Address {
    addr(0xa1)
}

pub fn strategy() -> Address {
    addr(0x51)
}

/// A second pool in the same community.
pub fn other_strategy() -> Address {
    addr(0x52)
}

pub fn alice() -> Address {
    addr(0x01)
}

pub fn bob() -> Address {
    addr(0x02)
}

/// `n` whole tokens with 18 decimals.
pub fn tokens(n: u64) -> Amount {
    Amount::from(n)
        .mul_div(&Amount::from(1_000_000_000_000_000_000), &Amount::from(1))
        .unwrap()
}

pub fn chains() -> Vec<ChainConfig> {
    vec![ChainConfig {
        chain_id: CHAIN,
        factory: factory(),
        start_block: 0,
    }]
}

/// Router over a fresh store plus the log of everything fed to it.
pub struct Harness {
    pub store: Arc<dyn EntityStore>,
    pub accessor: Arc<RecordedAccessor>,
    pub router: Router,
    pub log: Vec<ChainEvent>,
    block: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn EntityStore>) -> Self {
        let accessor = Arc::new(RecordedAccessor::new());
        record_community(&accessor);
        record_strategy(&accessor, 0);
        let router = Router::with_default_handlers(store.clone(), accessor.clone(), &chains()).unwrap();
        Self {
            store,
            accessor,
            router,
            log: Vec::new(),
            block: 1_000,
        }
    }

    /// Next event in log order, one per block.
    pub fn event(&mut self, source: &Address, payload: EventPayload) -> ChainEvent {
        self.block += 1;
        ChainEvent {
            chain_id: CHAIN,
            source: source.clone(),
            block_number: self.block,
            transaction_index: 0,
            log_index: 0,
            block_timestamp: 1_700_000_000 + self.block * 12,
            payload,
        }
    }

    /// Block the next event will land in.
    pub fn next_block(&self) -> u64 {
        self.block + 1
    }

    pub async fn apply(&mut self, source: &Address, payload: EventPayload) -> Outcome {
        let event = self.event(source, payload);
        self.log.push(event.clone());
        self.router.process(&event).await.unwrap()
    }

    pub fn load<E: Entity>(&self, id: &str) -> Option<E> {
        self.store.load::<E>(id).unwrap()
    }

    pub fn get<E: Entity>(&self, id: &str) -> E {
        self.load(id)
            .unwrap_or_else(|| panic!("{} {} missing", E::KIND, id))
    }

    pub fn digest(&self) -> String {
        self.store.digest().unwrap()
    }

    /// Factory announces the community and the community initializes.
    pub async fn create_community(&mut self) {
        let outcome = self
            .apply(
                &factory(),
                EventPayload::CommunityCreated { registry_community: community() },
            )
            .await;
        assert_eq!(outcome, Outcome::Applied);

        let outcome = self
            .apply(
                &community(),
                EventPayload::RegistryInitialized {
                    profile_id: "0xprofile".to_string(),
                    community_name: "Alpha Garden".to_string(),
                },
            )
            .await;
        assert_eq!(outcome, Outcome::Applied);
    }

    /// Community creates the pool and the strategy initializes.
    pub async fn create_strategy(&mut self, point_system: PointSystem) {
        self.create_pool(&strategy(), POOL_ID, point_system).await;
    }

    pub async fn create_pool(&mut self, address: &Address, pool_id: u64, point_system: PointSystem) {
        self.add_pool(address, pool_id).await;
        let outcome = self.initialize_pool(address, pool_id, point_system).await;
        assert_eq!(outcome, Outcome::Applied);
    }

    /// `PoolCreated` only: the strategy source is routed but not initialized.
    pub async fn add_pool(&mut self, address: &Address, pool_id: u64) {
        let outcome = self
            .apply(
                &community(),
                EventPayload::PoolCreated {
                    pool_id: pool_id.into(),
                    strategy: address.clone(),
                    community: community(),
                    token: token(),
                    metadata_pointer: String::new(),
                },
            )
            .await;
        assert_eq!(outcome, Outcome::Applied);
    }

    pub async fn initialize_pool(&mut self, address: &Address, pool_id: u64, point_system: PointSystem) -> Outcome {
        self.apply(
            address,
            EventPayload::InitializedCV2 {
                pool_id: pool_id.into(),
                data: StrategyInitData {
                    registry_community: community(),
                    proposal_type: ProposalType::Funding,
                    point_system,
                    max_amount: Amount::zero(),
                    cv_params: CvParams {
                        max_ratio: 2_000_000u64.into(),
                        weight: 10_000u64.into(),
                        decay: DECAY.into(),
                        min_threshold_points: 0u64.into(),
                    },
                    initial_allowlist: Vec::new(),
                },
            },
        )
        .await
    }

    pub async fn register(&mut self, member: &Address, amount: Amount) -> Outcome {
        self.apply(
            &community(),
            EventPayload::MemberRegistered { member: member.clone(), amount_staked: amount },
        )
        .await
    }

    /// Make `totalEffectiveActivePoints` read `total` from the next event on.
    pub fn set_total_points(&self, total: u64) {
        self.set_total_points_of(&strategy(), total);
    }

    pub fn set_total_points_of(&self, address: &Address, total: u64) {
        self.accessor
            .returns_from(
                self.next_block(),
                ViewCall::TotalEffectiveActivePoints { strategy: address.clone() },
                ViewValue::Amount(total.into()),
            )
            .unwrap();
    }
}

/// Everything `RegistryInitialized` reads for `community()`.
pub fn record_community(accessor: &RecordedAccessor) {
    let c = community();
    accessor.returns(ViewCall::RegistryFactory { community: c.clone() }, ViewValue::Address(factory())).unwrap();
    accessor.returns(
        ViewCall::CovenantIpfsHash { community: c.clone() },
        ViewValue::Text("QmCovenant".to_string()),
    ).unwrap();
    accessor.returns(
        ViewCall::RegisterStakeAmount { community: c.clone() },
        ViewValue::Amount(tokens(100)),
    ).unwrap();
    accessor.returns(ViewCall::CouncilSafe { community: c.clone() }, ViewValue::Address(addr(0xcc))).unwrap();
    accessor.returns(ViewCall::Allo { community: c.clone() }, ViewValue::Address(allo())).unwrap();
    accessor.returns(ViewCall::IsKickEnabled { community: c.clone() }, ViewValue::Bool(true)).unwrap();
    accessor.returns(ViewCall::CommunityFee { community: c.clone() }, ViewValue::Amount(Amount::zero())).unwrap();
    accessor.returns(ViewCall::GardenToken { community: c.clone() }, ViewValue::Address(token())).unwrap();
    accessor.returns(ViewCall::StrategyTemplate { community: c.clone() }, ViewValue::Address(addr(0x5e))).unwrap();
    accessor.returns(
        ViewCall::ProtocolFee { factory: factory(), community: c.clone() },
        ViewValue::Amount(Amount::from(1)),
    ).unwrap();
    accessor.returns(ViewCall::Name { token: token() }, ViewValue::Text("Garden Token".to_string())).unwrap();
    accessor.returns(ViewCall::Symbol { token: token() }, ViewValue::Text("GDN".to_string())).unwrap();
    accessor.returns(ViewCall::Decimals { token: token() }, ViewValue::Uint8(18)).unwrap();
    accessor.returns(
        ViewCall::BalanceOf { token: token(), owner: c },
        ViewValue::Amount(tokens(1_000)),
    ).unwrap();
}

/// Everything `InitializedCV` reads for `strategy()` and `other_strategy()`;
/// max conviction comes from the decay.
pub fn record_strategy(accessor: &RecordedAccessor, total: u64) {
    record_pool(accessor, &strategy(), POOL_ID, total);
    record_pool(accessor, &other_strategy(), POOL_ID + 1, total);
}

pub fn record_pool(accessor: &RecordedAccessor, s: &Address, pool_id: u64, total: u64) {
    accessor.returns(ViewCall::StrategyAllo { strategy: s.clone() }, ViewValue::Address(allo())).unwrap();
    accessor.returns(
        ViewCall::AlloPoolToken { allo: allo(), pool_id: pool_id.into() },
        ViewValue::Address(token()),
    ).unwrap();
    accessor.returns(ViewCall::PoolAmount { strategy: s.clone() }, ViewValue::Amount(Amount::zero())).unwrap();
    accessor.returns(
        ViewCall::TotalEffectiveActivePoints { strategy: s.clone() },
        ViewValue::Amount(total.into()),
    ).unwrap();
    accessor.set_decay(s, DECAY.into()).unwrap();
}
