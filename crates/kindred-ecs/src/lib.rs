//! Kindred ECS - entity/component registry with reactive query sets
//!
//! Components are attached to generational entity handles and stored in
//! per-kind sparse sets. Query sets are registered once with a matcher and then
//! kept up to date incrementally: every mutation re-tests only the mutated
//! entity against each live set, so reading a set is free.

mod component;
mod config;
mod entity;
mod error;
mod kind;
mod query;
mod registry;
mod store;
mod world;

pub use component::Component;
pub use config::WorldConfig;
pub use entity::Entity;
pub use error::{BoxError, EcsError, Result};
pub use kind::{ComponentKind, ComponentTuple, KindRegistry, KindSet};
pub use query::{EntityRef, HasAll, Matcher, QuerySet};
pub use registry::{QueryHandle, SetRegistry};
pub use store::{ComponentRef, ComponentStore, MutationObserver};
pub use world::{SharedWorld, World};
