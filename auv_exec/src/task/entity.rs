//! # Entity registry
//!
//! Entities are named, numerically-identified functional units inside
//! tasks, unique within the process. Labels are reserved at task startup
//! and resolved into `u8` ids by tasks that reference entities configured
//! elsewhere. Resolution of an unregistered label is an error; tasks that
//! can operate without the entity catch it into [`ENT_UNRESOLVED`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Mutex;

use thiserror::Error;

use bus_if::msg::ENT_NONE;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Sentinel id for entities that could not be resolved.
pub const ENT_UNRESOLVED: u8 = ENT_NONE;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Process-wide entity label registry. Ids are indices into the label list.
#[derive(Default)]
pub struct EntityDb {
    labels: Mutex<Vec<String>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by entity operations.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity label \"{0}\" is not registered")]
    UnknownLabel(String),

    #[error("entity address space exhausted while reserving \"{0}\"")]
    Exhausted(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EntityDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an entity label, returning its id. Reserving an already
    /// registered label returns the existing id.
    pub fn reserve(&self, label: &str) -> Result<u8, EntityError> {
        let mut labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(id) = labels.iter().position(|l| l == label) {
            return Ok(id as u8);
        }

        // Keep clear of the ENT_NONE sentinel
        if labels.len() >= ENT_NONE as usize {
            return Err(EntityError::Exhausted(label.into()));
        }

        labels.push(label.into());
        Ok((labels.len() - 1) as u8)
    }

    /// Resolve a label into its id. Fails if the label was never reserved.
    pub fn resolve(&self, label: &str) -> Result<u8, EntityError> {
        let labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());

        labels
            .iter()
            .position(|l| l == label)
            .map(|id| id as u8)
            .ok_or_else(|| EntityError::UnknownLabel(label.into()))
    }

    /// The label of an id, if it is registered.
    pub fn label_of(&self, id: u8) -> Option<String> {
        let labels = self.labels.lock().unwrap_or_else(|p| p.into_inner());

        labels.get(id as usize).cloned()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reserve_resolve() {
        let db = EntityDb::new();

        let a = db.reserve("Path Controller").unwrap();
        let b = db.reserve("Bottom Track").unwrap();
        assert_ne!(a, b);

        // Reservation is idempotent per label
        assert_eq!(db.reserve("Path Controller").unwrap(), a);

        assert_eq!(db.resolve("Bottom Track").unwrap(), b);
        assert_eq!(db.label_of(b).as_deref(), Some("Bottom Track"));

        // Unregistered labels fail resolution; callers may catch into the
        // sentinel id
        let id = db.resolve("Echo Sounder").unwrap_or(ENT_UNRESOLVED);
        assert_eq!(id, ENT_UNRESOLVED);
    }
}
