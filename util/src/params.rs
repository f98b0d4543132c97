//! Generic parameter functions
//!
//! Parameter files are TOML documents deserialised into per-task `Params`
//! structs. Constraint checking (ranges, sequence sizes, enumerated values)
//! is performed explicitly by each struct's `validate` implementation using
//! the helpers below; a failed check is fatal at bind time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::fs::read_to_string;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Could not parse the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

/// A parameter constraint violation.
#[derive(Debug, Error)]
pub enum InvalidParam {
    #[error("Parameter \"{name}\" = {value} is below the minimum of {min}")]
    BelowMinimum {
        name: String,
        value: String,
        min: String,
    },

    #[error("Parameter \"{name}\" = {value} is above the maximum of {max}")]
    AboveMaximum {
        name: String,
        value: String,
        max: String,
    },

    #[error("Parameter \"{name}\" has {len} elements, expected between {min} and {max}")]
    WrongSize {
        name: String,
        len: usize,
        min: usize,
        max: usize,
    },

    #[error("Parameter \"{name}\" = \"{value}\" is not one of the allowed values {allowed:?}")]
    NotInSet {
        name: String,
        value: String,
        allowed: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let params_str = read_to_string(param_file_path).map_err(LoadError::FileLoadError)?;

    toml::from_str(&params_str).map_err(LoadError::DeserialiseError)
}

/// Check that a scalar parameter lies within an optional closed range.
pub fn check_range<T>(
    name: &str,
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), InvalidParam>
where
    T: PartialOrd + Display,
{
    if let Some(ref m) = min {
        if value < *m {
            return Err(InvalidParam::BelowMinimum {
                name: name.into(),
                value: value.to_string(),
                min: m.to_string(),
            });
        }
    }

    if let Some(ref m) = max {
        if value > *m {
            return Err(InvalidParam::AboveMaximum {
                name: name.into(),
                value: value.to_string(),
                max: m.to_string(),
            });
        }
    }

    Ok(())
}

/// Check that a sequence parameter has an acceptable number of elements.
pub fn check_size<T>(name: &str, seq: &[T], min: usize, max: usize) -> Result<(), InvalidParam> {
    if seq.len() < min || seq.len() > max {
        return Err(InvalidParam::WrongSize {
            name: name.into(),
            len: seq.len(),
            min,
            max,
        });
    }

    Ok(())
}

/// Check that a string parameter is one of an enumerated set of values.
pub fn check_values(name: &str, value: &str, allowed: &[&str]) -> Result<(), InvalidParam> {
    if !allowed.contains(&value) {
        return Err(InvalidParam::NotInSet {
            name: name.into(),
            value: value.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range("x", 1.0, Some(0.0), Some(2.0)).is_ok());
        assert!(check_range("x", -1.0, Some(0.0), None).is_err());
        assert!(check_range("x", 3.0, None, Some(2.0)).is_err());
        assert!(check_range::<f64>("x", 3.0, None, None).is_ok());
    }

    #[test]
    fn test_check_size() {
        assert!(check_size("s", &[1, 2, 3], 1, 5).is_ok());
        assert!(check_size("s", &[1, 2, 3], 4, 5).is_err());
        assert!(check_size::<i32>("s", &[], 1, 5).is_err());
    }

    #[test]
    fn test_check_values() {
        assert!(check_values("v", "Simulation", &["Simulation", "Hardware"]).is_ok());
        assert!(check_values("v", "Flight", &["Simulation", "Hardware"]).is_err());
    }
}
