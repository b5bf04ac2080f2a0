//! File, directory and symbol names derived from a type name.
//!
//! Everything here is a pure function of the type name and the naming budget,
//! so collisions can be checked without running a generator.

use serde::{Deserialize, Serialize};

use crate::error::NamingConflictError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingBudget {
    /// Maximum number of characters of the type name kept in library names.
    pub library_name_len: usize,
}

impl NamingBudget {
    pub fn new(library_name_len: usize) -> Self {
        NamingBudget { library_name_len }
    }
}

pub fn library_name(type_name: &str, budget: NamingBudget) -> String {
    type_name.chars().take(budget.library_name_len).collect()
}

pub fn check_conflict(
    first: &str,
    second: &str,
    budget: NamingBudget,
) -> Result<(), NamingConflictError> {
    if first == second {
        return Ok(());
    }
    let a = library_name(first, budget);
    let b = library_name(second, budget);
    // Library directories land on case-insensitive filesystems on the AR side.
    if a.eq_ignore_ascii_case(&b) {
        return Err(NamingConflictError {
            first: first.to_string(),
            second: second.to_string(),
            library_name: a,
            budget: budget.library_name_len,
        });
    }
    Ok(())
}

/// Checks every pair; the first conflict in input order wins.
pub fn check_conflicts<S: AsRef<str>>(
    names: &[S],
    budget: NamingBudget,
) -> Result<(), NamingConflictError> {
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            check_conflict(a.as_ref(), b.as_ref(), budget)?;
        }
    }
    Ok(())
}

/// Names of every artifact and symbol generated for one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactNames {
    pub type_name: String,
    pub library_name: String,
    /// `exos_<type>.h`
    pub header_file: String,
    /// `lib<type>.c`
    pub source_file: String,
    /// Lower-case prefix of generated C functions and types.
    pub symbol_prefix: String,
    /// Upper-case prefix of generated C macros and enum constants.
    pub macro_prefix: String,
}

impl ArtifactNames {
    pub fn new(type_name: &str, budget: NamingBudget) -> Self {
        let lower = type_name.to_ascii_lowercase();
        ArtifactNames {
            type_name: type_name.to_string(),
            library_name: library_name(type_name, budget),
            header_file: format!("exos_{lower}.h"),
            source_file: format!("lib{lower}.c"),
            symbol_prefix: lower,
            macro_prefix: type_name.to_ascii_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_characters() {
        assert_eq!(library_name("WaterTankLevel", NamingBudget::new(10)), "WaterTankL");
        assert_eq!(library_name("Robot", NamingBudget::new(10)), "Robot");
    }

    #[test]
    fn conflict_depends_on_budget() {
        let err = check_conflict("ConveyorA", "ConveyorB", NamingBudget::new(7)).unwrap_err();
        assert_eq!(err.library_name, "Conveyo");
        assert!(check_conflict("ConveyorA", "ConveyorB", NamingBudget::new(10)).is_ok());
    }

    #[test]
    fn same_name_is_not_a_conflict() {
        assert!(check_conflict("Robot", "Robot", NamingBudget::new(3)).is_ok());
    }

    #[test]
    fn case_only_difference_conflicts() {
        assert!(check_conflict("robotarm1", "RobotArm2", NamingBudget::new(8)).is_err());
    }

    #[test]
    fn batch_reports_first_pair() {
        let err = check_conflicts(
            &["Alpha", "TemperatureA", "Beta", "TemperatureB"],
            NamingBudget::new(7),
        )
        .unwrap_err();
        assert_eq!(err.first, "TemperatureA");
        assert_eq!(err.second, "TemperatureB");
    }
}
