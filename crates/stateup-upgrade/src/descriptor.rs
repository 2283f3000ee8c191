use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use stateup_types::{AttrType, Block, TreeValue};
use thiserror::Error;

use crate::state::FlatAttributes;

/// Transforms a value written under `source_version` into the shape of `source_version + 1`.
pub type UpgradeFn =
    dyn Fn(&UpgradeContext<'_>, TreeValue) -> anyhow::Result<TreeValue> + Send + Sync;

/// Rewrites flat attributes written before the first typed upgrader existed.
pub type LegacyMigrateFn =
    dyn Fn(&UpgradeContext<'_>, FlatAttributes) -> anyhow::Result<FlatAttributes> + Send + Sync;

/// Everything an upgrade function may look at besides the value itself.
pub struct UpgradeContext<'a> {
    version: u64,
    schema: &'a SchemaDescriptor,
    provider: &'a (dyn Any + Send + Sync),
}

impl<'a> UpgradeContext<'a> {
    pub(crate) fn new(
        version: u64,
        schema: &'a SchemaDescriptor,
        provider: &'a (dyn Any + Send + Sync),
    ) -> Self {
        Self {
            version,
            schema,
            provider,
        }
    }

    /// Version of the value being handed to the function.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn schema(&self) -> &'a SchemaDescriptor {
        self.schema
    }

    /// Provider-level context supplied by the caller, if it has type `T`.
    pub fn provider<T: Any>(&self) -> Option<&'a T> {
        self.provider.downcast_ref::<T>()
    }
}

/// One edge of the upgrade chain, from `source_version` to `source_version + 1`.
#[derive(Clone)]
pub struct StateUpgrader {
    source_version: u64,
    source_type: AttrType,
    transform: Arc<UpgradeFn>,
}

impl StateUpgrader {
    /// `source_type` is the implied type of the resource at `source_version`; it is
    /// used to decode flat attributes stored under that version.
    pub fn new<F>(source_version: u64, source_type: AttrType, transform: F) -> Self
    where
        F: Fn(&UpgradeContext<'_>, TreeValue) -> anyhow::Result<TreeValue> + Send + Sync + 'static,
    {
        Self {
            source_version,
            source_type,
            transform: Arc::new(transform),
        }
    }

    pub fn source_version(&self) -> u64 {
        self.source_version
    }

    pub fn source_type(&self) -> &AttrType {
        &self.source_type
    }

    pub(crate) fn apply(
        &self,
        ctx: &UpgradeContext<'_>,
        value: TreeValue,
    ) -> anyhow::Result<TreeValue> {
        (self.transform)(ctx, value)
    }
}

impl fmt::Debug for StateUpgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpgrader")
            .field("source_version", &self.source_version)
            .field("source_type", &self.source_type)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub(crate) struct LegacyMigration {
    pub(crate) target_version: u64,
    pub(crate) migrate: Arc<LegacyMigrateFn>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("resource type name must not be empty")]
    EmptyResourceType,
    #[error("duplicate state upgrader for version {version}")]
    DuplicateUpgrader { version: u64 },
    #[error("state upgrader for version {version} must be below current version {current}")]
    UpgraderBeyondCurrent { version: u64, current: u64 },
    #[error("legacy migration target {target} exceeds current version {current}")]
    LegacyTargetBeyondCurrent { target: u64, current: u64 },
    #[error("legacy migration target {target} is past the first state upgrader at version {first}")]
    LegacyTargetAfterUpgrader { target: u64, first: u64 },
}

/// Immutable description of a resource type: its current schema version, the
/// current block, and the upgraders that walk older state forward.
#[derive(Clone)]
pub struct SchemaDescriptor {
    resource_type: String,
    version: u64,
    block: Block,
    implied: AttrType,
    upgraders: BTreeMap<u64, StateUpgrader>,
    legacy: Option<LegacyMigration>,
}

impl SchemaDescriptor {
    pub fn builder(
        resource_type: impl Into<String>,
        version: u64,
        block: Block,
    ) -> SchemaDescriptorBuilder {
        SchemaDescriptorBuilder {
            resource_type: resource_type.into(),
            version,
            block,
            upgraders: Vec::new(),
            legacy: None,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Current schema version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Implied type of the current block.
    pub fn implied_type(&self) -> &AttrType {
        &self.implied
    }

    pub fn upgrader(&self, source_version: u64) -> Option<&StateUpgrader> {
        self.upgraders.get(&source_version)
    }

    /// Registered upgraders in increasing source-version order.
    pub fn upgraders(&self) -> impl Iterator<Item = &StateUpgrader> {
        self.upgraders.values()
    }

    /// Version legacy flat migration lifts state to, when one is registered.
    pub fn legacy_target(&self) -> Option<u64> {
        self.legacy.as_ref().map(|legacy| legacy.target_version)
    }

    pub(crate) fn legacy_migration(&self) -> Option<&LegacyMigration> {
        self.legacy.as_ref()
    }

    /// Type to decode flat attributes stored under `version` with.
    pub fn type_for_version(&self, version: u64) -> Option<&AttrType> {
        if version == self.version {
            Some(&self.implied)
        } else {
            self.upgrader(version).map(StateUpgrader::source_type)
        }
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("resource_type", &self.resource_type)
            .field("version", &self.version)
            .field("block", &self.block)
            .field("upgraders", &self.upgraders.keys().collect::<Vec<_>>())
            .field("legacy_target", &self.legacy_target())
            .finish()
    }
}

pub struct SchemaDescriptorBuilder {
    resource_type: String,
    version: u64,
    block: Block,
    upgraders: Vec<StateUpgrader>,
    legacy: Option<LegacyMigration>,
}

impl SchemaDescriptorBuilder {
    pub fn upgrader(mut self, upgrader: StateUpgrader) -> Self {
        self.upgraders.push(upgrader);
        self
    }

    /// Shorthand for registering a [`StateUpgrader`].
    pub fn upgrade<F>(self, source_version: u64, source_type: AttrType, transform: F) -> Self
    where
        F: Fn(&UpgradeContext<'_>, TreeValue) -> anyhow::Result<TreeValue> + Send + Sync + 'static,
    {
        self.upgrader(StateUpgrader::new(source_version, source_type, transform))
    }

    /// Register a flat-to-flat migration applied once to state stored below
    /// `target_version`, which then continues through the typed upgraders.
    pub fn legacy_migration<F>(mut self, target_version: u64, migrate: F) -> Self
    where
        F: Fn(&UpgradeContext<'_>, FlatAttributes) -> anyhow::Result<FlatAttributes>
            + Send
            + Sync
            + 'static,
    {
        self.legacy = Some(LegacyMigration {
            target_version,
            migrate: Arc::new(migrate),
        });
        self
    }

    /// Validate and freeze the descriptor.
    ///
    /// Gaps in the chain are allowed here; they only fail state that needs the
    /// missing step.
    pub fn build(self) -> Result<SchemaDescriptor, SchemaError> {
        if self.resource_type.is_empty() {
            return Err(SchemaError::EmptyResourceType);
        }

        let mut upgraders = BTreeMap::new();
        for upgrader in self.upgraders {
            let version = upgrader.source_version;
            if version >= self.version {
                return Err(SchemaError::UpgraderBeyondCurrent {
                    version,
                    current: self.version,
                });
            }
            if upgraders.insert(version, upgrader).is_some() {
                return Err(SchemaError::DuplicateUpgrader { version });
            }
        }

        if let Some(legacy) = &self.legacy {
            let target = legacy.target_version;
            if target > self.version {
                return Err(SchemaError::LegacyTargetBeyondCurrent {
                    target,
                    current: self.version,
                });
            }
            if let Some(&first) = upgraders.keys().next() {
                if target > first {
                    return Err(SchemaError::LegacyTargetAfterUpgrader { target, first });
                }
            }
        }

        let implied = self.block.implied_type();
        Ok(SchemaDescriptor {
            resource_type: self.resource_type,
            version: self.version,
            block: self.block,
            implied,
            upgraders,
            legacy: self.legacy,
        })
    }
}
