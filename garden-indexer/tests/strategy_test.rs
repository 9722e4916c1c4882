//! Strategy activation, conviction accounting, proposals and disputes.

mod common;

use common::*;
use garden_indexer::accessor::ProposalView;
use garden_indexer::conviction::max_conviction;
use garden_indexer::event::CvParams;
use garden_indexer::{EventPayload, Outcome, ViewCall, ViewValue};
use garden_store::{
    Address, Amount, ArbitrableConfig, CVProposal, CVStrategy, CVStrategyConfig, DisputeStatus, MemberStrategy,
    PointSystem, ProposalDispute, ProposalStatus, Stake,
};

fn max_cv(points: u64) -> Amount {
    max_conviction(&points.into(), &DECAY.into()).unwrap()
}

fn proposal_id() -> String {
    CVProposal::id_for(&strategy(), &1u64.into())
}

fn stake_id(member: &Address, on: &Address) -> String {
    Stake::id_for(member, on, &1u64.into())
}

fn record_proposal(h: &Harness, from_block: u64, staked: u64, status: ProposalStatus) {
    record_proposal_on(h, &strategy(), from_block, staked, status);
}

fn record_proposal_on(h: &Harness, on: &Address, from_block: u64, staked: u64, status: ProposalStatus) {
    h.accessor.returns_from(
        from_block,
        ViewCall::Proposal { strategy: on.clone(), proposal_id: 1u64.into() },
        ViewValue::Proposal(ProposalView {
            submitter: bob(),
            beneficiary: bob(),
            requested_token: token(),
            requested_amount: tokens(10),
            staked_amount: staked.into(),
            proposal_status: status,
            block_last: from_block,
            conviction_last: Amount::zero(),
            threshold: 1_000u64.into(),
            arbitrable_config_version: 1u64.into(),
        }),
    ).unwrap();
}

async fn activate(h: &mut Harness, member: &Address, points: u64) -> Outcome {
    h.apply(
        &community(),
        EventPayload::MemberActivatedStrategy {
            member: member.clone(),
            strategy: strategy(),
            points_to_increase: points.into(),
        },
    )
    .await
}

async fn deactivate(h: &mut Harness, member: &Address) -> Outcome {
    h.apply(
        &community(),
        EventPayload::MemberDeactivatedStrategy { member: member.clone(), strategy: strategy() },
    )
    .await
}

async fn support(h: &mut Harness, amount: u64, total: u64) -> Outcome {
    support_on(h, &strategy(), amount, total).await
}

async fn support_on(h: &mut Harness, on: &Address, amount: u64, total: u64) -> Outcome {
    h.apply(
        on,
        EventPayload::SupportAdded {
            from: alice(),
            proposal_id: 1u64.into(),
            amount: amount.into(),
            total_staked_amount: total.into(),
            conviction_last: 7u64.into(),
        },
    )
    .await
}

#[tokio::test]
async fn test_strategy_initialization() {
    let mut h = Harness::new();
    h.create_community().await;
    h.set_total_points(40);
    h.create_strategy(PointSystem::Unlimited).await;

    let row: CVStrategy = h.get(strategy().as_str());
    assert!(!row.is_enabled);
    assert_eq!(row.token, token());
    assert_eq!(row.registry_community, community().to_string());
    assert_eq!(row.total_effective_active_points, 40u64.into());
    assert_eq!(row.max_cv_supply, max_cv(40));
    assert!(row.member_active.is_empty());

    let config: CVStrategyConfig = h.get(&row.config);
    assert_eq!(config.id, CVStrategyConfig::id_for(&strategy(), &POOL_ID.into()));
    assert_eq!(config.point_system, PointSystem::Unlimited);
    assert_eq!(config.decay, DECAY.into());
    assert!(config.allowlist.is_empty());
}

#[tokio::test]
async fn test_strategy_toggle_keeps_points() {
    let mut h = Harness::new();
    h.create_community().await;
    h.set_total_points(40);
    h.create_strategy(PointSystem::Fixed).await;

    let toggles = [
        (EventPayload::StrategyAdded { strategy: strategy() }, true),
        (EventPayload::StrategyRemoved { strategy: strategy() }, false),
        (EventPayload::StrategyAdded { strategy: strategy() }, true),
    ];
    for (payload, enabled) in toggles {
        assert_eq!(h.apply(&community(), payload).await, Outcome::Applied);
        let row: CVStrategy = h.get(strategy().as_str());
        assert_eq!(row.is_enabled, enabled);
        assert_eq!(row.total_effective_active_points, 40u64.into());
    }
}

#[tokio::test]
async fn test_activation_updates_points_and_conviction_together() {
    let mut h = Harness::new();
    h.create_community().await;
    h.register(&alice(), tokens(100)).await;
    h.create_strategy(PointSystem::Fixed).await;

    h.set_total_points(100);
    assert_eq!(activate(&mut h, &alice(), 100).await, Outcome::Applied);

    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.total_effective_active_points, 100u64.into());
    assert_eq!(row.max_cv_supply, max_cv(100));
    assert!(row.member_active.contains(&alice()));

    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert_eq!(member_strategy.activated_points, 100u64.into());

    // A second activation must not duplicate the member
    activate(&mut h, &alice(), 100).await;
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.member_active.len(), 1);

    h.set_total_points(0);
    assert_eq!(deactivate(&mut h, &alice()).await, Outcome::Applied);

    let row: CVStrategy = h.get(strategy().as_str());
    assert!(!row.member_active.contains(&alice()));
    assert!(row.total_effective_active_points.is_zero());
    assert!(row.max_cv_supply.is_zero());
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert!(member_strategy.activated_points.is_zero());
}

#[tokio::test]
async fn test_activation_requires_member() {
    let mut h = Harness::new();
    h.create_community().await;
    h.create_strategy(PointSystem::Fixed).await;
    let before = h.digest();

    assert_eq!(activate(&mut h, &alice(), 100).await, Outcome::Skipped);
    assert_eq!(h.digest(), before);
}

#[tokio::test]
async fn test_power_changes_on_strategy() {
    let mut h = Harness::new();
    h.create_community().await;
    h.create_strategy(PointSystem::Unlimited).await;

    let decrease = EventPayload::PowerDecreased {
        member: alice(),
        tokens_unstaked: 5u64.into(),
        points_to_decrease: 5u64.into(),
    };

    // Without a member strategy the totals still follow the contract
    h.set_total_points(40);
    assert_eq!(h.apply(&strategy(), decrease.clone()).await, Outcome::Applied);
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.total_effective_active_points, 40u64.into());
    assert_eq!(row.max_cv_supply, max_cv(40));
    assert!(h.load::<MemberStrategy>(&MemberStrategy::id_for(&alice(), &strategy())).is_none());

    h.set_total_points(30);
    let increase = EventPayload::PowerIncreased {
        member: alice(),
        tokens_staked: 30u64.into(),
        points_to_increase: 30u64.into(),
    };
    assert_eq!(h.apply(&strategy(), increase).await, Outcome::Applied);
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.max_cv_supply, max_cv(30));

    h.set_total_points(25);
    assert_eq!(h.apply(&strategy(), decrease).await, Outcome::Applied);
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert_eq!(member_strategy.activated_points, 25u64.into());
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.total_effective_active_points, 25u64.into());
    assert_eq!(row.max_cv_supply, max_cv(25));
}

#[tokio::test]
async fn test_params_and_allowlist_updates() {
    let mut h = Harness::new();
    h.create_community().await;
    h.set_total_points(50);
    h.create_strategy(PointSystem::Capped).await;

    let new_decay = 9_965_402u64;
    h.accessor.set_decay_from(h.next_block(), &strategy(), new_decay.into()).unwrap();
    h.apply(
        &strategy(),
        EventPayload::CVParamsUpdated {
            cv_params: CvParams {
                max_ratio: 1_000_000u64.into(),
                weight: 5_000u64.into(),
                decay: new_decay.into(),
                min_threshold_points: 10u64.into(),
            },
        },
    )
    .await;

    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.max_cv_supply, max_conviction(&50u64.into(), &new_decay.into()).unwrap());
    let config: CVStrategyConfig = h.get(&row.config);
    assert_eq!(config.decay, new_decay.into());
    assert_eq!(config.min_threshold_points, 10u64.into());

    h.apply(
        &strategy(),
        EventPayload::AllowlistMembersAdded { pool_id: POOL_ID.into(), members: vec![bob(), alice(), bob()] },
    )
    .await;
    h.apply(
        &strategy(),
        EventPayload::AllowlistMembersRemoved { pool_id: POOL_ID.into(), members: vec![bob()] },
    )
    .await;
    let config: CVStrategyConfig = h.get(&row.config);
    assert_eq!(config.allowlist.iter().cloned().collect::<Vec<_>>(), vec![alice()]);
}

#[tokio::test]
async fn test_proposal_support_lifecycle() {
    let mut h = Harness::new();
    h.create_community().await;
    h.register(&alice(), tokens(100)).await;
    h.create_strategy(PointSystem::Fixed).await;
    h.set_total_points(100);
    activate(&mut h, &alice(), 100).await;

    record_proposal(&h, 0, 0, ProposalStatus::Active);
    let created = h
        .apply(&strategy(), EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
        .await;
    assert_eq!(created, Outcome::Applied);
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.proposal_status, ProposalStatus::Active);
    assert_eq!(proposal.requested_amount, tokens(10));
    assert_eq!(proposal.arbitrable_config, ArbitrableConfig::id_for(&strategy(), &1u64.into()));
    assert_eq!(proposal.created_at, proposal.updated_at);

    assert_eq!(support(&mut h, 60, 60).await, Outcome::Applied);
    let stake: Stake = h.get(&stake_id(&alice(), &strategy()));
    assert_eq!(stake.amount, 60u64.into());
    assert_eq!(stake.pool_id, POOL_ID.into());
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert_eq!(member_strategy.total_staked_points, 60u64.into());
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.staked_amount, 60u64.into());
    assert_eq!(proposal.conviction_last, 7u64.into());
    assert_eq!(proposal.max_cv_staked, max_cv(60));

    // Lowering support applies the negative delta
    support(&mut h, 20, 20).await;
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert_eq!(member_strategy.total_staked_points, 20u64.into());

    assert_eq!(
        h.apply(&strategy(), EventPayload::PointsDeactivated { member: alice() }).await,
        Outcome::Applied
    );
    let stake: Stake = h.get(&stake_id(&alice(), &strategy()));
    assert!(stake.amount.is_zero());
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert!(member_strategy.total_staked_points.is_zero());
    let proposal: CVProposal = h.get(&proposal_id());
    assert!(proposal.staked_amount.is_zero());
    assert!(proposal.max_cv_staked.is_zero());
}

#[tokio::test]
async fn test_support_without_member_strategy_is_skipped() {
    let mut h = Harness::new();
    h.create_community().await;
    h.create_strategy(PointSystem::Unlimited).await;
    record_proposal(&h, 0, 0, ProposalStatus::Active);
    h.apply(&strategy(), EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
        .await;

    assert_eq!(support(&mut h, 60, 60).await, Outcome::Skipped);
    assert!(h.load::<Stake>(&stake_id(&alice(), &strategy())).is_none());
}

#[tokio::test]
async fn test_dispute_and_ruling() {
    let mut h = Harness::new();
    h.create_community().await;
    h.create_strategy(PointSystem::Unlimited).await;
    record_proposal(&h, 0, 0, ProposalStatus::Active);
    h.apply(&strategy(), EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
        .await;

    let arbitrator = addr(0xab);
    record_proposal(&h, h.next_block(), 0, ProposalStatus::Disputed);
    let disputed = h
        .apply(
            &strategy(),
            EventPayload::ProposalDisputed {
                arbitrator: arbitrator.clone(),
                proposal_id: 1u64.into(),
                dispute_id: 3u64.into(),
                challenger: bob(),
                context: "off-topic".to_string(),
            },
        )
        .await;
    assert_eq!(disputed, Outcome::Applied);

    let dispute_id = ProposalDispute::id_for(&arbitrator, &3u64.into());
    let dispute: ProposalDispute = h.get(&dispute_id);
    assert_eq!(dispute.status, DisputeStatus::Waiting);
    assert_eq!(dispute.proposal, proposal_id());
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.proposal_status, ProposalStatus::Disputed);

    record_proposal(&h, h.next_block(), 0, ProposalStatus::Rejected);
    let ruled_block = h.next_block();
    h.apply(
        &strategy(),
        EventPayload::Ruling { arbitrator, dispute_id: 3u64.into(), ruling: 2u64.into() },
    )
    .await;

    let dispute: ProposalDispute = h.get(&dispute_id);
    assert_eq!(dispute.status, DisputeStatus::Solved);
    assert_eq!(dispute.ruling_outcome, Some(2u64.into()));
    assert_eq!(dispute.ruled_at, Some(1_700_000_000 + ruled_block * 12));
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.proposal_status, ProposalStatus::Rejected);
}

#[tokio::test]
async fn test_pool_and_proposal_updates() {
    let mut h = Harness::new();
    h.create_community().await;
    h.create_strategy(PointSystem::Unlimited).await;
    record_proposal(&h, 0, 0, ProposalStatus::Active);
    h.apply(&strategy(), EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
        .await;

    h.apply(&strategy(), EventPayload::PoolAmountIncreased { amount: tokens(30) }).await;
    h.apply(&strategy(), EventPayload::PoolAmountIncreased { amount: tokens(20) }).await;
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.pool_amount, tokens(50));

    h.apply(
        &strategy(),
        EventPayload::ArbitrableConfigUpdated {
            current_arbitrable_config_version: 2u64.into(),
            arbitrator: addr(0xab),
            tribunal_safe: addr(0xcd),
            submitter_collateral_amount: 10u64.into(),
            challenger_collateral_amount: 20u64.into(),
            default_ruling: 1u64.into(),
            default_ruling_timeout: 3_600u64.into(),
        },
    )
    .await;
    let arbitration: ArbitrableConfig = h.get(&ArbitrableConfig::id_for(&strategy(), &2u64.into()));
    assert_eq!(arbitration.version, 2u64.into());
    assert_eq!(arbitration.arbitrator, addr(0xab));
    assert_eq!(arbitration.challenger_collateral_amount, 20u64.into());

    record_proposal(&h, h.next_block(), 0, ProposalStatus::Executed);
    h.accessor.returns_from(
        h.next_block(),
        ViewCall::PoolAmount { strategy: strategy() },
        ViewValue::Amount(tokens(40)),
    ).unwrap();
    let distributed = h
        .apply(
            &strategy(),
            EventPayload::Distributed { proposal_id: 1u64.into(), beneficiary: bob(), amount: tokens(10) },
        )
        .await;
    assert_eq!(distributed, Outcome::Applied);
    let row: CVStrategy = h.get(strategy().as_str());
    assert_eq!(row.pool_amount, tokens(40));
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.proposal_status, ProposalStatus::Executed);

    record_proposal(&h, h.next_block(), 0, ProposalStatus::Cancelled);
    h.apply(&strategy(), EventPayload::ProposalCancelled { proposal_id: 1u64.into() }).await;
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.proposal_status, ProposalStatus::Cancelled);
}

fn arbitrable_config_update(version: u64, submitter_collateral: u64) -> EventPayload {
    EventPayload::ArbitrableConfigUpdated {
        current_arbitrable_config_version: version.into(),
        arbitrator: addr(0xab),
        tribunal_safe: addr(0xcd),
        submitter_collateral_amount: submitter_collateral.into(),
        challenger_collateral_amount: 5u64.into(),
        default_ruling: 0u64.into(),
        default_ruling_timeout: 600u64.into(),
    }
}

#[tokio::test]
async fn test_arbitrable_config_before_initialization_is_kept() {
    let mut h = Harness::new();
    h.create_community().await;
    h.add_pool(&strategy(), POOL_ID).await;

    // The initializer emits the first dispute settings before InitializedCV2
    assert_eq!(h.apply(&strategy(), arbitrable_config_update(1, 7)).await, Outcome::Applied);
    assert_eq!(h.initialize_pool(&strategy(), POOL_ID, PointSystem::Unlimited).await, Outcome::Applied);

    let first_id = ArbitrableConfig::id_for(&strategy(), &1u64.into());
    let first: ArbitrableConfig = h.get(&first_id);
    assert_eq!(first.arbitrator, addr(0xab));
    assert_eq!(first.submitter_collateral_amount, 7u64.into());
    assert_eq!(first.strategy, strategy().to_string());

    record_proposal(&h, 0, 0, ProposalStatus::Active);
    h.apply(&strategy(), EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
        .await;

    // A later version does not rewrite the one the proposal points at
    h.apply(&strategy(), arbitrable_config_update(2, 9)).await;
    let proposal: CVProposal = h.get(&proposal_id());
    assert_eq!(proposal.arbitrable_config, first_id);
    let pinned: ArbitrableConfig = h.get(&proposal.arbitrable_config);
    assert_eq!(pinned.submitter_collateral_amount, 7u64.into());
    let latest: ArbitrableConfig = h.get(&ArbitrableConfig::id_for(&strategy(), &2u64.into()));
    assert_eq!(latest.submitter_collateral_amount, 9u64.into());
}

#[tokio::test]
async fn test_points_deactivated_only_touches_its_strategy() {
    let mut h = Harness::new();
    h.create_community().await;
    h.register(&alice(), tokens(100)).await;
    h.create_strategy(PointSystem::Fixed).await;
    h.create_pool(&other_strategy(), POOL_ID + 1, PointSystem::Fixed).await;

    for on in [strategy(), other_strategy()] {
        h.set_total_points_of(&on, 100);
        let activated = h
            .apply(
                &community(),
                EventPayload::MemberActivatedStrategy {
                    member: alice(),
                    strategy: on.clone(),
                    points_to_increase: 100u64.into(),
                },
            )
            .await;
        assert_eq!(activated, Outcome::Applied);

        record_proposal_on(&h, &on, 0, 0, ProposalStatus::Active);
        h.apply(&on, EventPayload::ProposalCreated { pool_id: POOL_ID.into(), proposal_id: 1u64.into() })
            .await;
        assert_eq!(support_on(&mut h, &on, 40, 40).await, Outcome::Applied);
    }

    assert_eq!(
        h.apply(&strategy(), EventPayload::PointsDeactivated { member: alice() }).await,
        Outcome::Applied
    );

    let stake: Stake = h.get(&stake_id(&alice(), &strategy()));
    assert!(stake.amount.is_zero());
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &strategy()));
    assert!(member_strategy.total_staked_points.is_zero());

    let stake: Stake = h.get(&stake_id(&alice(), &other_strategy()));
    assert_eq!(stake.amount, 40u64.into());
    let member_strategy: MemberStrategy = h.get(&MemberStrategy::id_for(&alice(), &other_strategy()));
    assert_eq!(member_strategy.total_staked_points, 40u64.into());
    let proposal: CVProposal = h.get(&CVProposal::id_for(&other_strategy(), &1u64.into()));
    assert_eq!(proposal.staked_amount, 40u64.into());
}
