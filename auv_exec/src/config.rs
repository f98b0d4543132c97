//! # Configuration loading
//!
//! Configuration is a hierarchical TOML document with one section per task
//! under `[tasks."Task Name"]`. Two directives extend the plain format:
//!
//! - `include = ["common.toml", ...]` merges other files in first, with the
//!   including file taking precedence;
//! - `[profiles.<Name>.tasks."Task Name"]` sections overlay the base task
//!   sections when the named profile is selected (e.g. "Simulation" vs
//!   "Hardware").
//!
//! Each task deserialises its own section into a typed `Params` struct and
//! validates it; an invalid parameter is fatal at bind time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use toml::value::{Table, Value};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Loaded configuration: per-task parameter sections plus global settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// This system's id on the bus.
    pub system_id: u16,

    /// Per-task parameter tables.
    tasks: Table,
}

/// A single task's slice of the configuration.
#[derive(Debug, Clone, Default)]
pub struct TaskSection {
    pub name: String,
    pub table: Table,
}

/// The set of parameter keys whose values changed in the last (re)bind,
/// exposed to `on_update_parameters`.
#[derive(Debug, Clone, Default)]
pub struct ChangedParams {
    /// True for the initial bind, where every parameter counts as changed.
    initial: bool,
    keys: HashSet<String>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {0:?}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Could not parse config file {0:?}: {1}")]
    FileParse(PathBuf, toml::de::Error),

    #[error("Invalid include directive in {0:?}: expected an array of file names")]
    BadInclude(PathBuf),

    #[error("Profile \"{0}\" is not defined in the configuration")]
    UnknownProfile(String),
}

/// Errors raised while binding a task's parameters.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("Could not deserialise parameters: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] util::params::InvalidParam),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Config {
    /// Load a configuration file, resolving includes and applying the given
    /// profile overlay.
    pub fn load(path: &Path, profile: Option<&str>) -> Result<Self, ConfigError> {
        let mut root = load_table(path)?;

        let system_id = match root.get("system_id").and_then(Value::as_integer) {
            Some(id) => id as u16,
            None => 0x0001,
        };

        let mut tasks = match root.remove("tasks") {
            Some(Value::Table(t)) => t,
            _ => Table::new(),
        };

        // Apply the profile overlay on top of the base task sections
        if let Some(name) = profile {
            let overlay = root
                .get("profiles")
                .and_then(Value::as_table)
                .and_then(|p| p.get(name))
                .and_then(Value::as_table)
                .ok_or_else(|| ConfigError::UnknownProfile(name.into()))?;

            if let Some(Value::Table(overlay_tasks)) = overlay.get("tasks").cloned() {
                merge_tables(&mut tasks, &overlay_tasks);
            }
        }

        Ok(Self { system_id, tasks })
    }

    /// An empty configuration where every task runs on its defaults.
    pub fn empty(system_id: u16) -> Self {
        Self {
            system_id,
            tasks: Table::new(),
        }
    }

    /// Get the named task's section. Tasks without a section run on their
    /// parameter defaults.
    pub fn section(&self, name: &str) -> TaskSection {
        let table = self
            .tasks
            .get(name)
            .and_then(Value::as_table)
            .cloned()
            .unwrap_or_default();

        TaskSection {
            name: name.into(),
            table,
        }
    }
}

impl TaskSection {
    /// Build a section directly from a TOML string, for tests and tools.
    pub fn from_toml(name: &str, toml_str: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            name: name.into(),
            table: toml::from_str(toml_str)?,
        })
    }

    /// Deserialise this section into a typed parameter struct. Missing keys
    /// take their default values.
    pub fn parse<P>(&self) -> Result<P, ParamError>
    where
        P: DeserializeOwned,
    {
        Ok(Value::Table(self.table.clone()).try_into()?)
    }

    /// Compute the set of keys whose values differ from a previous section.
    pub fn diff(&self, previous: &TaskSection) -> ChangedParams {
        let mut keys = HashSet::new();

        for (key, value) in &self.table {
            if previous.table.get(key) != Some(value) {
                keys.insert(key.clone());
            }
        }

        for key in previous.table.keys() {
            if !self.table.contains_key(key) {
                keys.insert(key.clone());
            }
        }

        ChangedParams {
            initial: false,
            keys,
        }
    }
}

impl ChangedParams {
    /// All parameters changed: used for the initial bind.
    pub fn all() -> Self {
        Self {
            initial: true,
            keys: HashSet::new(),
        }
    }

    /// True if the named parameter changed in the last bind.
    pub fn changed(&self, name: &str) -> bool {
        self.initial || self.keys.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        !self.initial && self.keys.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Read one file, recursively merging its includes underneath it.
fn load_table(path: &Path) -> Result<Table, ConfigError> {
    let text =
        fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;

    let mut table: Table =
        toml::from_str(&text).map_err(|e| ConfigError::FileParse(path.to_path_buf(), e))?;

    let includes = match table.remove("include") {
        Some(Value::Array(files)) => {
            let mut names = Vec::new();
            for f in files {
                match f {
                    Value::String(s) => names.push(s),
                    _ => return Err(ConfigError::BadInclude(path.to_path_buf())),
                }
            }
            names
        }
        Some(_) => return Err(ConfigError::BadInclude(path.to_path_buf())),
        None => Vec::new(),
    };

    if includes.is_empty() {
        return Ok(table);
    }

    // Includes are merged in order, the including file wins
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut base = Table::new();

    for name in includes {
        let included = load_table(&dir.join(name))?;
        merge_tables(&mut base, &included);
    }

    merge_tables(&mut base, &table);

    Ok(base)
}

/// Deep merge `overlay` into `base`, overwriting scalar values and
/// descending into nested tables.
fn merge_tables(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(b)), Value::Table(o)) => merge_tables(b, o),
            (_, v) => {
                base.insert(key.clone(), v.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
