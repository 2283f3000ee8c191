//! Upgrades persisted resource state written under an older schema version into
//! the shape of the current schema.
//!
//! The pipeline is linear: resolve the stored version, decode the flat attribute
//! map, run the per-version upgraders, prune removed attributes, coerce to the
//! current types, normalize absent blocks and materialize a new
//! [`PersistedState`]. The caller's state is only read.

pub mod chain;
pub mod coerce;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod flatmap;
pub mod materialize;
pub mod normalize;
mod pipeline;
pub mod prune;
pub mod state;
pub mod version;

pub use config::{UpgradeOptions, VersionRadix};
pub use descriptor::{
    SchemaDescriptor, SchemaDescriptorBuilder, SchemaError, StateUpgrader, UpgradeContext,
};
pub use error::UpgradeError;
pub use pipeline::{UpgradeOutcome, upgrade_resource_state, upgrade_states};
pub use state::{FlatAttributes, PersistedState, SCHEMA_VERSION_KEY, StateMeta};
pub use stateup_types::{AttrType, Attribute, Block, NestedBlock, NestingMode, TreeValue};
