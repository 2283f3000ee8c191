use thiserror::Error;

use crate::coerce::CoercionError;
use crate::flatmap::DecodeError;
use crate::materialize::MaterializeError;
use crate::version::VersionError;

/// Why a single resource state could not be upgraded. The input state is never
/// modified when one of these is returned.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("invalid schema version: {0}")]
    VersionParse(#[from] VersionError),
    #[error("failed to decode flat attributes: {0}")]
    Decode(#[from] DecodeError),
    #[error("stored schema version {found} is newer than current version {current}")]
    UnsupportedVersion { found: u64, current: u64 },
    #[error("no state upgrader registered for version {version} (current version {target})")]
    MissingUpgradeStep { version: u64, target: u64 },
    #[error("state upgrade from version {at_version} failed: {source}")]
    UpgradeStep {
        at_version: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error("failed to materialize upgraded state: {0}")]
    Materialization(#[from] MaterializeError),
}
