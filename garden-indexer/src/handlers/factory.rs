//! Registry factory events.

use async_trait::async_trait;
use garden_store::{Address, Amount, RegistryCommunity, RegistryFactory, SourceKind};
use tracing::{debug, info};

use super::{EventHandler, HandlerScope};
use crate::error::HandlerError;
use crate::event::{ChainEvent, EventKind, EventPayload};

pub struct FactoryHandler;

#[async_trait]
impl EventHandler for FactoryHandler {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Factory
    }

    fn event_kinds(&self) -> &'static [EventKind] {
        &[
            EventKind::CommunityCreated,
            EventKind::ProtocolFeeSet,
            EventKind::CommunityValiditySet,
        ]
    }

    async fn handle(&self, scope: &mut HandlerScope<'_>, event: &ChainEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::CommunityCreated { registry_community } => {
                community_created(scope, registry_community)
            }
            EventPayload::ProtocolFeeSet { community, fee } => protocol_fee_set(scope, community, fee),
            EventPayload::CommunityValiditySet { community, is_valid } => {
                community_validity_set(scope, community, *is_valid)
            }
            other => Err(HandlerError::Unexpected(other.kind())),
        }
    }
}

fn community_created(scope: &mut HandlerScope<'_>, community: &Address) -> Result<(), HandlerError> {
    let factory = scope.address();
    debug!(factory = %factory, community = %community, "CommunityCreated");

    if scope.exists::<RegistryFactory>(factory.as_str())? {
        debug!(factory = %factory, "Registry factory already indexed");
    } else {
        scope.save(&RegistryFactory {
            id: factory.to_string(),
            chain_id: scope.chain_id(),
        })?;
        info!(factory = %factory, chain_id = scope.chain_id(), "Created registry factory");
    }

    scope.register_source(SourceKind::Community, community.clone());
    info!(community = %community, factory = %factory, "Registered community source");
    Ok(())
}

fn protocol_fee_set(scope: &mut HandlerScope<'_>, community: &Address, fee: &Amount) -> Result<(), HandlerError> {
    debug!(community = %community, fee = %fee, "ProtocolFeeSet");

    let mut row = scope.require::<RegistryCommunity>(community.as_str())?;
    row.protocol_fee = fee.clone();
    scope.save(&row)
}

fn community_validity_set(
    scope: &mut HandlerScope<'_>,
    community: &Address,
    is_valid: bool,
) -> Result<(), HandlerError> {
    debug!(community = %community, is_valid, "CommunityValiditySet");

    let mut row = scope.require::<RegistryCommunity>(community.as_str())?;
    row.is_valid = is_valid;
    scope.save(&row)
}
