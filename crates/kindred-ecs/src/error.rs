use crate::entity::Entity;

/// Error type returned by a component's own cleanup logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while mutating a world.
///
/// Absent entities and components are never errors; lookups return `None` and
/// removals of missing data are no-ops.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0} is not alive")]
    DeadEntity(Entity),

    #[error("failed to release {kind} component of entity {entity}: {source}")]
    Release {
        entity: Entity,
        kind: &'static str,
        #[source]
        source: BoxError,
    },
}

pub type Result<T, E = EcsError> = std::result::Result<T, E>;
