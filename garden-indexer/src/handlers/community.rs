//! Registry community events: membership, stake, strategy activation and
//! governance parameters.

use async_trait::async_trait;
use garden_store::{
    Address, Allo, Amount, CVStrategy, CVStrategyConfig, Member, MemberCommunity, MemberStrategy,
    PointSystem, RegistryCommunity, SourceKind, TokenGarden, TOKEN_NATIVE,
};
use tracing::{debug, error, info, warn};

use super::{EventHandler, HandlerScope};
use crate::accessor::AccessorError;
use crate::error::HandlerError;
use crate::event::{ChainEvent, EventKind, EventPayload};

pub struct CommunityHandler;

#[async_trait]
impl EventHandler for CommunityHandler {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Community
    }

    fn event_kinds(&self) -> &'static [EventKind] {
        &[
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
        ]
    }

    async fn handle(&self, scope: &mut HandlerScope<'_>, event: &ChainEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::RegistryInitialized { profile_id, community_name } => {
                registry_initialized(scope, profile_id, community_name).await
            }
            EventPayload::MemberRegistered { member, amount_staked } => {
                member_registered(scope, member, amount_staked, None).await
            }
            EventPayload::MemberRegisteredWithCovenant { member, amount_staked, covenant_sig } => {
                member_registered(scope, member, amount_staked, Some(covenant_sig.as_str())).await
            }
            EventPayload::MemberUnregistered { member, .. } => member_unregistered(scope, member).await,
            EventPayload::MemberKicked { member, .. } => member_kicked(scope, member).await,
            EventPayload::StrategyAdded { strategy } => set_strategy_enabled(scope, strategy, true),
            EventPayload::StrategyRemoved { strategy } => set_strategy_enabled(scope, strategy, false),
            EventPayload::PoolCreated { pool_id, strategy, metadata_pointer, .. } => {
                debug!(strategy = %strategy, pool_id = %pool_id, "PoolCreated");
                pool_created(scope, strategy, metadata_pointer)
            }
            EventPayload::PoolRejected { strategy } => pool_rejected(scope, strategy),
            EventPayload::MemberActivatedStrategy { member, strategy, points_to_increase } => {
                member_activated(scope, member, strategy, points_to_increase).await
            }
            EventPayload::MemberDeactivatedStrategy { member, strategy } => {
                member_deactivated(scope, member, strategy).await
            }
            EventPayload::MemberPowerIncreased { member, staked_amount } => {
                member_power_changed(scope, member, staked_amount, true).await
            }
            EventPayload::MemberPowerDecreased { member, unstaked_amount } => {
                member_power_changed(scope, member, unstaked_amount, false).await
            }
            EventPayload::CommunityNameUpdated { community_name } => {
                update_community(scope, event.kind(), |c| c.community_name = community_name.clone())
            }
            EventPayload::CovenantIpfsHashUpdated { covenant_ipfs_hash } => {
                covenant_updated(scope, covenant_ipfs_hash)
            }
            EventPayload::KickEnabledUpdated { is_kick_enabled } => {
                update_community(scope, event.kind(), |c| c.is_kick_enabled = *is_kick_enabled)
            }
            EventPayload::CouncilSafeChangeStarted { pending_council_safe } => {
                update_community(scope, event.kind(), |c| {
                    c.pending_new_council_safe = Some(pending_council_safe.clone())
                })
            }
            EventPayload::CouncilSafeUpdated { council_safe } => {
                update_community(scope, event.kind(), |c| {
                    c.council_safe = council_safe.clone();
                    c.pending_new_council_safe = None;
                })
            }
            EventPayload::BasisStakedAmountUpdated { register_stake_amount } => {
                update_community(scope, event.kind(), |c| {
                    c.register_stake_amount = register_stake_amount.clone()
                })
            }
            EventPayload::CommunityFeeUpdated { community_fee } => {
                update_community(scope, event.kind(), |c| c.community_fee = community_fee.clone())
            }
            EventPayload::FeeReceiverChanged { fee_receiver } => {
                update_community(scope, event.kind(), |c| {
                    c.protocol_fee_receiver = (!fee_receiver.is_zero()).then(|| fee_receiver.clone())
                })
            }
            EventPayload::CommunityArchived { archived } => {
                update_community(scope, event.kind(), |c| c.archived = *archived)
            }
            other => Err(HandlerError::Unexpected(other.kind())),
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

async fn registry_initialized(
    scope: &mut HandlerScope<'_>,
    profile_id: &str,
    community_name: &str,
) -> Result<(), HandlerError> {
    let community = scope.address();
    debug!(community = %community, "RegistryInitialized");

    if scope.exists::<RegistryCommunity>(community.as_str())? {
        debug!(community = %community, "Community already indexed");
        return Ok(());
    }

    let contract = scope.community_contract(community);
    let factory_address = contract.registry_factory().await?;
    let covenant_ipfs_hash = contract.covenant_ipfs_hash().await?;
    let register_stake_amount = contract.register_stake_amount().await?;
    let council_safe = contract.council_safe().await?;
    let allo_address = contract.allo().await?;
    let is_kick_enabled = contract.is_kick_enabled().await?;
    let community_fee = contract.community_fee().await?;
    let token = contract.garden_token().await?;
    let strategy_template = contract.strategy_template().await?;

    let protocol_fee = match scope.factory_contract(&factory_address).protocol_fee(community).await {
        Ok(fee) => fee,
        Err(AccessorError::Reverted { reason, .. }) => {
            error!(community = %community, reason = %reason, "Protocol fee call reverted, using zero");
            Amount::zero()
        }
        Err(e) => return Err(e.into()),
    };

    let erc20 = scope.erc20(&token);
    let mut garden = match scope.load::<TokenGarden>(token.as_str())? {
        Some(garden) => garden,
        None => {
            let garden = TokenGarden {
                id: token.to_string(),
                name: erc20.name().await?,
                symbol: erc20.symbol().await?,
                decimals: erc20.decimals().await?,
                total_balance: Amount::zero(),
                chain_id: scope.chain_id(),
                ipfs_covenant: None,
            };
            info!(token = %token, symbol = %garden.symbol, "Created token garden");
            garden
        }
    };
    garden.total_balance = erc20.balance_of(community).await?;
    garden.ipfs_covenant = (!covenant_ipfs_hash.is_empty()).then(|| covenant_ipfs_hash.clone());
    scope.save(&garden)?;

    if !scope.exists::<Allo>(allo_address.as_str())? {
        scope.save(&Allo {
            id: allo_address.to_string(),
            chain_id: scope.chain_id(),
            token_native: TOKEN_NATIVE.to_string(),
        })?;
        info!(allo = %allo_address, "Created allo");
    }

    scope.save(&RegistryCommunity {
        id: community.to_string(),
        chain_id: scope.chain_id(),
        community_name: community_name.to_string(),
        profile_id: profile_id.to_string(),
        covenant_ipfs_hash,
        register_stake_amount,
        council_safe,
        pending_new_council_safe: None,
        allo_address,
        is_kick_enabled,
        community_fee,
        protocol_fee,
        protocol_fee_receiver: None,
        register_token: token,
        registry_factory: scope.factory().clone(),
        strategy_template,
        is_valid: true,
        archived: false,
        members_count: 0,
        garden: garden.id.clone(),
    })?;
    info!(community = %community, name = %community_name, "Created registry community");
    Ok(())
}

// ============================================================================
// Membership
// ============================================================================

async fn member_registered(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    amount_staked: &Amount,
    covenant_sig: Option<&str>,
) -> Result<(), HandlerError> {
    let community_address = scope.address();
    debug!(community = %community_address, member = %member, amount = %amount_staked, "MemberRegistered");

    let mut community = scope.require::<RegistryCommunity>(community_address.as_str())?;
    let mut garden = scope.require::<TokenGarden>(&community.garden)?;

    if !scope.exists::<Member>(member.as_str())? {
        scope.save(&Member::new(member))?;
        info!(member = %member, "Created member");
    }

    garden.total_balance = scope
        .erc20(&community.register_token)
        .balance_of(community_address)
        .await?;
    scope.save(&garden)?;

    let id = MemberCommunity::id_for(member, community_address);
    let mut membership = scope
        .load::<MemberCommunity>(&id)?
        .unwrap_or_else(|| MemberCommunity::new(member, community_address));
    let was_registered = membership.is_registered;

    membership.staked_tokens += amount_staked;
    membership.is_registered = true;
    if let Some(sig) = covenant_sig {
        membership.covenant_signature = Some(sig.to_string());
    }
    scope.save(&membership)?;

    if !was_registered {
        community.members_count += 1;
        scope.save(&community)?;
    }
    info!(
        community = %community_address,
        member = %member,
        staked = %membership.staked_tokens,
        members = community.members_count,
        "Member registered"
    );
    Ok(())
}

async fn member_unregistered(scope: &mut HandlerScope<'_>, member: &Address) -> Result<(), HandlerError> {
    debug!(community = %scope.address(), member = %member, "MemberUnregistered");

    let id = MemberCommunity::id_for(member, scope.address());
    let membership = scope.require::<MemberCommunity>(&id)?;
    deregister(scope, member, membership).await
}

async fn member_kicked(scope: &mut HandlerScope<'_>, member: &Address) -> Result<(), HandlerError> {
    debug!(community = %scope.address(), member = %member, "MemberKicked");

    scope.require::<Member>(member.as_str())?;
    let id = MemberCommunity::id_for(member, scope.address());
    let membership = scope.require::<MemberCommunity>(&id)?;
    deregister(scope, member, membership).await
}

/// Terminal state shared by unregistration and kicks.
async fn deregister(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    mut membership: MemberCommunity,
) -> Result<(), HandlerError> {
    let community_address = scope.address();
    let was_registered = membership.is_registered;

    membership.is_registered = false;
    membership.staked_tokens = Amount::zero();
    scope.save(&membership)?;

    if let Some(mut community) = scope.load::<RegistryCommunity>(community_address.as_str())? {
        if was_registered {
            match community.members_count.checked_sub(1) {
                Some(count) => community.members_count = count,
                None => warn!(community = %community_address, "Members count already zero"),
            }
            scope.save(&community)?;
        }
        refresh_garden_balance(scope, &community).await?;
    }

    info!(community = %community_address, member = %member, "Member deregistered");
    Ok(())
}

async fn member_power_changed(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    amount: &Amount,
    increase: bool,
) -> Result<(), HandlerError> {
    let community_address = scope.address();
    debug!(community = %community_address, member = %member, amount = %amount, increase, "MemberPowerChanged");

    let id = MemberCommunity::id_for(member, community_address);
    let mut membership = scope.require::<MemberCommunity>(&id)?;

    if increase {
        membership.staked_tokens += amount;
    } else {
        let (remaining, floored) = membership.staked_tokens.saturating_sub(amount);
        if floored {
            warn!(
                community = %community_address,
                member = %member,
                staked = %membership.staked_tokens,
                amount = %amount,
                "Stake decrease exceeds staked tokens, flooring at zero"
            );
        }
        membership.staked_tokens = remaining;
    }
    scope.save(&membership)?;

    if let Some(community) = scope.load::<RegistryCommunity>(community_address.as_str())? {
        refresh_garden_balance(scope, &community).await?;
    }
    Ok(())
}

/// Re-read the community's token balance into its garden, when the garden exists.
async fn refresh_garden_balance(
    scope: &mut HandlerScope<'_>,
    community: &RegistryCommunity,
) -> Result<(), HandlerError> {
    let Some(mut garden) = scope.load::<TokenGarden>(&community.garden)? else {
        return Ok(());
    };
    garden.total_balance = scope
        .erc20(&community.register_token)
        .balance_of(scope.address())
        .await?;
    scope.save(&garden)
}

// ============================================================================
// Strategies
// ============================================================================

fn set_strategy_enabled(
    scope: &mut HandlerScope<'_>,
    strategy: &Address,
    enabled: bool,
) -> Result<(), HandlerError> {
    debug!(community = %scope.address(), strategy = %strategy, enabled, "StrategyEnabledChanged");

    let mut row = scope.require::<CVStrategy>(strategy.as_str())?;
    row.is_enabled = enabled;
    if enabled {
        row.archived = false;
    }
    scope.save(&row)
}

fn pool_created(scope: &mut HandlerScope<'_>, strategy: &Address, metadata_pointer: &str) -> Result<(), HandlerError> {
    if !metadata_pointer.is_empty() {
        if let Some(mut row) = scope.load::<CVStrategy>(strategy.as_str())? {
            row.metadata_hash = Some(metadata_pointer.to_string());
            scope.save(&row)?;
        }
    }

    scope.register_source(SourceKind::Strategy, strategy.clone());
    info!(community = %scope.address(), strategy = %strategy, "Registered strategy source");
    Ok(())
}

fn pool_rejected(scope: &mut HandlerScope<'_>, strategy: &Address) -> Result<(), HandlerError> {
    debug!(community = %scope.address(), strategy = %strategy, "PoolRejected");

    let mut row = scope.require::<CVStrategy>(strategy.as_str())?;
    row.archived = true;
    scope.save(&row)
}

async fn member_activated(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    strategy: &Address,
    points: &Amount,
) -> Result<(), HandlerError> {
    debug!(strategy = %strategy, member = %member, points = %points, "MemberActivatedStrategy");

    scope.require::<Member>(member.as_str())?;
    let mut row = scope.require::<CVStrategy>(strategy.as_str())?;

    let contract = scope.strategy_contract(strategy);
    let total = contract.total_effective_active_points().await?;
    row.max_cv_supply = contract.max_conviction(&total).await?;
    row.total_effective_active_points = total;

    if !row.member_active.insert(member.clone()) {
        warn!(strategy = %strategy, member = %member, "Member already active in strategy");
    }
    scope.save(&row)?;

    let fixed_points = scope
        .load::<CVStrategyConfig>(&row.config)?
        .map_or(false, |config| config.point_system == PointSystem::Fixed);
    if fixed_points {
        let mut member_strategy = MemberStrategy::new(member, strategy);
        member_strategy.activated_points = points.clone();
        scope.save(&member_strategy)?;
    }
    Ok(())
}

async fn member_deactivated(
    scope: &mut HandlerScope<'_>,
    member: &Address,
    strategy: &Address,
) -> Result<(), HandlerError> {
    debug!(strategy = %strategy, member = %member, "MemberDeactivatedStrategy");

    scope.require::<Member>(member.as_str())?;
    let mut row = scope.require::<CVStrategy>(strategy.as_str())?;
    let mut member_strategy = scope.require::<MemberStrategy>(&MemberStrategy::id_for(member, strategy))?;

    if !row.member_active.remove(member) {
        debug!(strategy = %strategy, member = %member, "Member was not active");
    }

    let contract = scope.strategy_contract(strategy);
    let total = contract.total_effective_active_points().await?;
    row.max_cv_supply = contract.max_conviction(&total).await?;
    row.total_effective_active_points = total;

    member_strategy.activated_points = Amount::zero();
    scope.save(&member_strategy)?;
    scope.save(&row)
}

// ============================================================================
// Governance
// ============================================================================

fn update_community<F>(scope: &mut HandlerScope<'_>, kind: EventKind, apply: F) -> Result<(), HandlerError>
where
    F: FnOnce(&mut RegistryCommunity),
{
    let community = scope.address();
    debug!(community = %community, event = %kind, "Community parameter update");

    let mut row = scope.require::<RegistryCommunity>(community.as_str())?;
    apply(&mut row);
    scope.save(&row)
}

fn covenant_updated(scope: &mut HandlerScope<'_>, covenant_ipfs_hash: &str) -> Result<(), HandlerError> {
    let community = scope.address();
    debug!(community = %community, covenant = %covenant_ipfs_hash, "CovenantIpfsHashUpdated");

    let mut row = scope.require::<RegistryCommunity>(community.as_str())?;
    row.covenant_ipfs_hash = covenant_ipfs_hash.to_string();

    if let Some(mut garden) = scope.load::<TokenGarden>(&row.garden)? {
        garden.ipfs_covenant = (!covenant_ipfs_hash.is_empty()).then(|| covenant_ipfs_hash.to_string());
        scope.save(&garden)?;
    }
    scope.save(&row)
}
