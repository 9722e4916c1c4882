//! Conviction-voting strategy events: pool setup, member power, proposals,
//! support and disputes.

use async_trait::async_trait;
use garden_store::{
    Address, Amount, ArbitrableConfig, CVProposal, CVStrategy, CVStrategyConfig, DisputeStatus, MemberSet,
    MemberStrategy, ProposalDispute, SourceKind, Stake,
};
use tracing::{debug, error, info, warn};

use super::{EventHandler, HandlerScope};
use crate::error::HandlerError;
use crate::event::{ChainEvent, CvParams, EventKind, EventPayload, StrategyInitData};

pub struct StrategyHandler;

#[async_trait]
impl EventHandler for StrategyHandler {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Strategy
    }

    fn event_kinds(&self) -> &'static [EventKind] {
        &[
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
        ]
    }

    async fn handle(&self, scope: &mut HandlerScope<'_>, event: &ChainEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::InitializedCV { pool_id, data } => {
                // First initializer version has no allowlist: everyone may participate
                let allowlist = std::iter::once(Address::zero()).collect();
                initialized(scope, pool_id, data, allowlist).await
            }
            EventPayload::InitializedCV2 { pool_id, data } => {
                let allowlist = data.initial_allowlist.iter().cloned().collect();
                initialized(scope, pool_id, data, allowlist).await
            }
            EventPayload::PowerIncreased { member, points_to_increase, .. } => {
                power_changed(scope, member, points_to_increase, true).await
            }
            EventPayload::PowerDecreased { member, points_to_decrease, .. } => {
                power_changed(scope, member, points_to_decrease, false).await
            }
            EventPayload::CVParamsUpdated { cv_params } => cv_params_updated(scope, cv_params).await,
            EventPayload::ArbitrableConfigUpdated {
                current_arbitrable_config_version,
                arbitrator,
                tribunal_safe,
                submitter_collateral_amount,
                challenger_collateral_amount,
                default_ruling,
                default_ruling_timeout,
            } => {
                // Emitted while the strategy initializes, before InitializedCV
                let address = scope.address();
                debug!(strategy = %address, version = %current_arbitrable_config_version, "ArbitrableConfigUpdated");
                scope.save(&ArbitrableConfig {
                    id: ArbitrableConfig::id_for(address, current_arbitrable_config_version),
                    version: current_arbitrable_config_version.clone(),
                    strategy: address.to_string(),
                    arbitrator: arbitrator.clone(),
                    tribunal_safe: tribunal_safe.clone(),
                    submitter_collateral_amount: submitter_collateral_amount.clone(),
                    challenger_collateral_amount: challenger_collateral_amount.clone(),
                    default_ruling: default_ruling.clone(),
                    default_ruling_timeout: default_ruling_timeout.clone(),
                })
            }
            EventPayload::PoolAmountIncreased { amount } => {
                debug!(strategy = %scope.address(), amount = %amount, "PoolAmountIncreased");
                let mut strategy = scope.require::<CVStrategy>(scope.address().as_str())?;
                strategy.pool_amount += amount;
                scope.save(&strategy)
            }
            EventPayload::ProposalCreated { proposal_id, .. } => proposal_created(scope, proposal_id).await,
            EventPayload::SupportAdded {
                from,
                proposal_id,
                amount,
                total_staked_amount,
                conviction_last,
            } => support_added(scope, from, proposal_id, amount, total_staked_amount, conviction_last).await,
            EventPayload::PointsDeactivated { member } => points_deactivated(scope, member).await,
            EventPayload::Distributed { proposal_id, amount, .. } => {
                debug!(strategy = %scope.address(), proposal = %proposal_id, amount = %amount, "Distributed");
                let mut proposal = scope.require::<CVProposal>(&CVProposal::id_for(scope.address(), proposal_id))?;
                let mut strategy = scope.require::<CVStrategy>(&proposal.strategy)?;
                refresh_status(scope, &mut proposal).await?;
                strategy.pool_amount = scope.strategy_contract(scope.address()).pool_amount().await?;
                scope.save(&proposal)?;
                scope.save(&strategy)
            }
            EventPayload::ProposalCancelled { proposal_id } => {
                debug!(strategy = %scope.address(), proposal = %proposal_id, "ProposalCancelled");
                let mut proposal = scope.require::<CVProposal>(&CVProposal::id_for(scope.address(), proposal_id))?;
                refresh_status(scope, &mut proposal).await?;
                scope.save(&proposal)
            }
            EventPayload::ProposalDisputed {
                arbitrator,
                proposal_id,
                dispute_id,
                challenger,
                context,
            } => proposal_disputed(scope, arbitrator, proposal_id, dispute_id, challenger, context).await,
            EventPayload::Ruling { arbitrator, dispute_id, ruling } => {
                dispute_ruled(scope, arbitrator, dispute_id, ruling).await
            }
            EventPayload::AllowlistMembersAdded { pool_id, members } => {
                update_allowlist(scope, pool_id, members, true)
            }
            EventPayload::AllowlistMembersRemoved { pool_id, members } => {
                update_allowlist(scope, pool_id, members, false)
            }
            other => Err(HandlerError::Unexpected(other.kind())),
        }
    }
}

// ============================================================================
// Pool setup
// ============================================================================

async fn initialized(
    scope: &mut HandlerScope<'_>,
    pool_id: &Amount,
    data: &StrategyInitData,
    allowlist: MemberSet,
) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, pool_id = %pool_id, "InitializedCV");

    if scope.exists::<CVStrategy>(address.as_str())? {
        debug!(strategy = %address, "Strategy already indexed");
        return Ok(());
    }

    let contract = scope.strategy_contract(address);
    let allo = contract.allo().await?;
    let token = contract.pool_token(&allo, pool_id).await?;
    let pool_amount = contract.pool_amount().await?;
    let total = contract.total_effective_active_points().await?;
    let max_cv_supply = contract.max_conviction(&total).await?;

    let config = CVStrategyConfig {
        id: CVStrategyConfig::id_for(address, pool_id),
        strategy: address.to_string(),
        point_system: data.point_system,
        proposal_type: data.proposal_type,
        max_amount: data.max_amount.clone(),
        decay: data.cv_params.decay.clone(),
        max_ratio: data.cv_params.max_ratio.clone(),
        weight: data.cv_params.weight.clone(),
        min_threshold_points: data.cv_params.min_threshold_points.clone(),
        allowlist,
    };
    scope.save(&config)?;

    scope.save(&CVStrategy {
        id: address.to_string(),
        pool_id: pool_id.clone(),
        registry_community: data.registry_community.to_string(),
        config: config.id.clone(),
        token,
        pool_amount,
        is_enabled: false,
        archived: false,
        total_effective_active_points: total,
        max_cv_supply,
        member_active: MemberSet::new(),
        metadata_hash: None,
    })?;
    info!(
        strategy = %address,
        pool_id = %pool_id,
        community = %data.registry_community,
        "Created conviction voting strategy"
    );
    Ok(())
}

async fn cv_params_updated(scope: &mut HandlerScope<'_>, params: &CvParams) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(
        strategy = %address,
        weight = %params.weight,
        decay = %params.decay,
        min_threshold_points = %params.min_threshold_points,
        max_ratio = %params.max_ratio,
        "CVParamsUpdated"
    );

    let mut strategy = scope.require::<CVStrategy>(address.as_str())?;
    let mut config = scope.require::<CVStrategyConfig>(&strategy.config)?;

    config.weight = params.weight.clone();
    config.decay = params.decay.clone();
    config.min_threshold_points = params.min_threshold_points.clone();
    config.max_ratio = params.max_ratio.clone();

    // The conviction ceiling depends on decay
    strategy.max_cv_supply = scope
        .strategy_contract(address)
        .max_conviction(&strategy.total_effective_active_points)
        .await?;

    scope.save(&config)?;
    scope.save(&strategy)
}

fn update_allowlist(
    scope: &mut HandlerScope<'_>,
    pool_id: &Amount,
    members: &[Address],
    add: bool,
) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, pool_id = %pool_id, count = members.len(), add, "Allowlist update");

    let mut config = scope.require::<CVStrategyConfig>(&CVStrategyConfig::id_for(address, pool_id))?;
    for member in members {
        if add {
            config.allowlist.insert(member.clone());
        } else {
            config.allowlist.remove(member);
        }
    }
    scope.save(&config)
}

// ============================================================================
// Member power
// ============================================================================

async fn power_changed(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    points: &Amount,
    increase: bool,
) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, member = %member, points = %points, increase, "PowerChanged");

    // The total moved on-chain whether or not this member has a row here
    let mut strategy = scope.require::<CVStrategy>(address.as_str())?;
    let contract = scope.strategy_contract(address);
    let total = contract.total_effective_active_points().await?;
    strategy.max_cv_supply = contract.max_conviction(&total).await?;
    strategy.total_effective_active_points = total;
    scope.save(&strategy)?;

    let member_strategy_id = MemberStrategy::id_for(member, address);
    let existing = scope.load::<MemberStrategy>(&member_strategy_id)?;
    if !increase && existing.is_none() {
        error!(
            strategy = %address,
            member_strategy = %member_strategy_id,
            "Power decreased for a member without a member strategy"
        );
        return Ok(());
    }

    let mut member_strategy = existing.unwrap_or_else(|| MemberStrategy::new(member, address));
    if increase {
        member_strategy.activated_points += points;
    } else {
        let (remaining, floored) = member_strategy.activated_points.saturating_sub(points);
        if floored {
            warn!(
                strategy = %address,
                member = %member,
                activated = %member_strategy.activated_points,
                points = %points,
                "Power decrease exceeds activated points, flooring at zero"
            );
        }
        member_strategy.activated_points = remaining;
    }
    scope.save(&member_strategy)
}

// ============================================================================
// Proposals
// ============================================================================

async fn proposal_created(scope: &mut HandlerScope<'_>, proposal_number: &Amount) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, proposal = %proposal_number, "ProposalCreated");

    scope.require::<CVStrategy>(address.as_str())?;
    let id = CVProposal::id_for(address, proposal_number);
    if scope.exists::<CVProposal>(&id)? {
        debug!(proposal = %id, "Proposal already indexed");
        return Ok(());
    }

    let contract = scope.strategy_contract(address);
    let view = contract.proposal(proposal_number).await?;
    let max_cv_staked = contract.max_conviction(&view.staked_amount).await?;

    scope.save(&CVProposal {
        id: id.clone(),
        strategy: address.to_string(),
        proposal_number: proposal_number.clone(),
        beneficiary: view.beneficiary,
        requested_token: view.requested_token,
        requested_amount: view.requested_amount,
        staked_amount: view.staked_amount,
        conviction_last: view.conviction_last,
        block_last: view.block_last,
        threshold: view.threshold,
        max_cv_staked,
        proposal_status: view.proposal_status,
        submitter: view.submitter,
        arbitrable_config: ArbitrableConfig::id_for(address, &view.arbitrable_config_version),
        created_at: scope.timestamp(),
        updated_at: scope.timestamp(),
    })?;
    info!(strategy = %address, proposal = %id, "Created proposal");
    Ok(())
}

async fn support_added(
    scope: &mut HandlerScope<'_>,
    from: &Address,
    proposal_number: &Amount,
    amount: &Amount,
    total_staked_amount: &Amount,
    conviction_last: &Amount,
) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, member = %from, proposal = %proposal_number, amount = %amount, "SupportAdded");

    let mut proposal = scope.require::<CVProposal>(&CVProposal::id_for(address, proposal_number))?;
    let strategy = scope.require::<CVStrategy>(&proposal.strategy)?;
    let mut member_strategy = scope.require::<MemberStrategy>(&MemberStrategy::id_for(from, address))?;

    let stake_id = Stake::id_for(from, address, proposal_number);
    let mut stake = scope.load::<Stake>(&stake_id)?.unwrap_or_else(|| Stake {
        id: stake_id.clone(),
        member: from.to_string(),
        proposal: proposal.id.clone(),
        pool_id: strategy.pool_id.clone(),
        amount: Amount::zero(),
        created_at: scope.timestamp(),
    });

    // Apply the signed difference between the new and previous stake
    match amount.checked_sub(&stake.amount) {
        Some(increase) => member_strategy.total_staked_points += &increase,
        None => {
            let decrease = stake.amount.checked_sub(amount).unwrap_or_default();
            let (remaining, floored) = member_strategy.total_staked_points.saturating_sub(&decrease);
            if floored {
                warn!(stake = %stake_id, "Support decrease exceeds staked points, flooring at zero");
            }
            member_strategy.total_staked_points = remaining;
        }
    }

    stake.amount = amount.clone();
    stake.pool_id = strategy.pool_id.clone();

    proposal.max_cv_staked = scope
        .strategy_contract(address)
        .max_conviction(total_staked_amount)
        .await?;
    proposal.block_last = scope.block_number();
    proposal.staked_amount = total_staked_amount.clone();
    proposal.conviction_last = conviction_last.clone();
    proposal.updated_at = scope.timestamp();

    scope.save(&stake)?;
    scope.save(&member_strategy)?;
    scope.save(&proposal)
}

/// Withdraw all of a member's support on this strategy's proposals.
async fn points_deactivated(scope: &mut HandlerScope<'_>, member: &Address) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, member = %member, "PointsDeactivated");

    let stakes: Vec<Stake> = scope
        .list_prefix::<Stake>(&Stake::prefix_for(member, address))?
        .into_iter()
        .filter(|stake| !stake.amount.is_zero())
        .collect();

    let contract = scope.strategy_contract(address);
    let member_strategy_id = MemberStrategy::id_for(member, address);

    for mut stake in stakes {
        let Some(mut proposal) = scope.load::<CVProposal>(&stake.proposal)? else {
            debug!(proposal = %stake.proposal, "Stake references unknown proposal");
            continue;
        };

        let withdrawn = std::mem::take(&mut stake.amount);
        let (remaining, floored) = proposal.staked_amount.saturating_sub(&withdrawn);
        if floored {
            warn!(proposal = %proposal.id, "Withdrawn stake exceeds proposal stake, flooring at zero");
        }
        proposal.staked_amount = remaining;

        let view = contract.proposal(&proposal.proposal_number).await?;
        proposal.max_cv_staked = contract.max_conviction(&view.staked_amount).await?;
        proposal.conviction_last = view.conviction_last;
        proposal.updated_at = scope.timestamp();

        if let Some(mut member_strategy) = scope.load::<MemberStrategy>(&member_strategy_id)? {
            let (remaining, floored) = member_strategy.total_staked_points.saturating_sub(&withdrawn);
            if floored {
                warn!(member_strategy = %member_strategy_id, "Withdrawn stake exceeds staked points, flooring at zero");
            }
            member_strategy.total_staked_points = remaining;
            scope.save(&member_strategy)?;
        } else {
            debug!(member_strategy = %member_strategy_id, "No member strategy to adjust");
        }

        scope.save(&stake)?;
        scope.save(&proposal)?;
    }
    Ok(())
}

async fn refresh_status(scope: &HandlerScope<'_>, proposal: &mut CVProposal) -> Result<(), HandlerError> {
    let view = scope
        .strategy_contract(scope.address())
        .proposal(&proposal.proposal_number)
        .await?;
    proposal.proposal_status = view.proposal_status;
    proposal.updated_at = scope.timestamp();
    Ok(())
}

// ============================================================================
// Disputes
// ============================================================================

async fn proposal_disputed(
    scope: &mut HandlerScope<'_>,
    arbitrator: &Address,
    proposal_number: &Amount,
    dispute_id: &Amount,
    challenger: &Address,
    context: &str,
) -> Result<(), HandlerError> {
    let address = scope.address();
    debug!(strategy = %address, proposal = %proposal_number, dispute = %dispute_id, "ProposalDisputed");

    let mut proposal = scope.require::<CVProposal>(&CVProposal::id_for(address, proposal_number))?;
    refresh_status(scope, &mut proposal).await?;

    let dispute = ProposalDispute {
        id: ProposalDispute::id_for(arbitrator, dispute_id),
        dispute_id: dispute_id.clone(),
        proposal: proposal.id.clone(),
        challenger: challenger.clone(),
        context: context.to_string(),
        status: DisputeStatus::Waiting,
        created_at: scope.timestamp(),
        ruled_at: None,
        ruling_outcome: None,
    };
    scope.save(&dispute)?;
    scope.save(&proposal)?;
    info!(proposal = %proposal.id, dispute = %dispute.id, "Created proposal dispute");
    Ok(())
}

async fn dispute_ruled(
    scope: &mut HandlerScope<'_>,
    arbitrator: &Address,
    dispute_id: &Amount,
    ruling: &Amount,
) -> Result<(), HandlerError> {
    debug!(strategy = %scope.address(), arbitrator = %arbitrator, dispute = %dispute_id, ruling = %ruling, "Ruling");

    let mut dispute = scope.require::<ProposalDispute>(&ProposalDispute::id_for(arbitrator, dispute_id))?;
    let mut proposal = scope.require::<CVProposal>(&dispute.proposal)?;

    dispute.status = DisputeStatus::Solved;
    dispute.ruled_at = Some(scope.timestamp());
    dispute.ruling_outcome = Some(ruling.clone());
    refresh_status(scope, &mut proposal).await?;

    scope.save(&dispute)?;
    scope.save(&proposal)
}
