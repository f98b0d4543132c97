//! Parameters for the vehicle supervisor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::config::ParamError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Supervisor parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Entities whose errors remain relevant while performing a safe plan.
    /// An empty list disables the safe-plan filter entirely.
    pub safe_entities: Vec<String>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            safe_entities: Vec::new(),
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ParamError> {
        util::params::check_size("safe_entities", &self.safe_entities, 0, 32)?;

        Ok(())
    }
}
