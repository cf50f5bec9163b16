//! Built-in orderings for entities and changes.

use std::cmp::Ordering;

use super::{ChangeEntity, Entity};
use crate::errors::PipelineResult;
use crate::ordering::OrderingRegistry;

pub const TYPE_THEN_ID: &str = "TypeThenId";
pub const TYPE_THEN_ID_THEN_VERSION: &str = "TypeThenIdThenVersion";
pub const STREAMABLE: &str = "streamable";
pub const SEEKABLE: &str = "seekable";

/// Nodes before ways before relations, then ascending id.
pub fn type_then_id(a: &Entity, b: &Entity) -> Ordering {
    a.entity_type()
        .cmp(&b.entity_type())
        .then_with(|| a.id().cmp(&b.id()))
}

pub fn type_then_id_then_version(a: &Entity, b: &Entity) -> Ordering {
    type_then_id(a, b).then_with(|| a.version().cmp(&b.version()))
}

/// Change order for applying a change stream in a single pass.
pub fn change_streamable(a: &ChangeEntity, b: &ChangeEntity) -> Ordering {
    type_then_id_then_version(&a.entity, &b.entity)
}

/// Change order for appliers that seek by entity; creates come before
/// modifies before deletes for the same entity.
pub fn change_seekable(a: &ChangeEntity, b: &ChangeEntity) -> Ordering {
    type_then_id(&a.entity, &b.entity).then_with(|| a.action.cmp(&b.action))
}

/// Orderings available to entity sorters, `TypeThenId` being the default.
pub fn entity_orderings() -> PipelineResult<OrderingRegistry<Entity>> {
    let mut registry = OrderingRegistry::new();
    registry.register(TYPE_THEN_ID, type_then_id, true)?;
    registry.register(TYPE_THEN_ID_THEN_VERSION, type_then_id_then_version, false)?;
    Ok(registry)
}

/// Orderings available to change sorters, `streamable` being the default.
pub fn change_orderings() -> PipelineResult<OrderingRegistry<ChangeEntity>> {
    let mut registry = OrderingRegistry::new();
    registry.register(STREAMABLE, change_streamable, true)?;
    registry.register(SEEKABLE, change_seekable, false)?;
    Ok(registry)
}
