//! Declared timer families and state cells of a keyed function
//!
//! A function lists up front which timer families and state cells it uses.
//! The callback context checks every access against this list, so a typo in
//! a family or cell name fails the run instead of silently creating a slot
//! nobody handles.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{StateError, StateResult, TimerError, TimerResult};

/// Timer families and state cells a function may touch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    timer_families: BTreeSet<String>,
    state_cells: BTreeSet<String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an event-time timer family
    pub fn with_timer_family(mut self, family: impl Into<String>) -> Self {
        self.timer_families.insert(family.into());
        self
    }

    /// Declare a state cell
    pub fn with_state_cell(mut self, cell: impl Into<String>) -> Self {
        self.state_cells.insert(cell.into());
        self
    }

    pub fn declares_family(&self, family: &str) -> bool {
        self.timer_families.contains(family)
    }

    pub fn declares_cell(&self, cell: &str) -> bool {
        self.state_cells.contains(cell)
    }

    pub fn timer_families(&self) -> impl Iterator<Item = &str> {
        self.timer_families.iter().map(String::as_str)
    }

    pub fn state_cells(&self) -> impl Iterator<Item = &str> {
        self.state_cells.iter().map(String::as_str)
    }

    pub fn check_family(&self, family: &str) -> TimerResult<()> {
        if self.declares_family(family) {
            Ok(())
        } else {
            Err(TimerError::UndeclaredFamily {
                family: family.to_string(),
            })
        }
    }

    pub fn check_cell(&self, cell: &str) -> StateResult<()> {
        if self.declares_cell(cell) {
            Ok(())
        } else {
            Err(StateError::UndeclaredCell {
                cell: cell.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations() {
        let caps = Capabilities::new()
            .with_timer_family("Callback")
            .with_state_cell("MyKey");

        assert!(caps.check_family("Callback").is_ok());
        assert!(caps.check_cell("MyKey").is_ok());
        assert!(matches!(
            caps.check_family("Other"),
            Err(TimerError::UndeclaredFamily { .. })
        ));
        assert!(matches!(
            caps.check_cell("Other"),
            Err(StateError::UndeclaredCell { .. })
        ));
        assert_eq!(caps.timer_families().collect::<Vec<_>>(), vec!["Callback"]);
    }
}
