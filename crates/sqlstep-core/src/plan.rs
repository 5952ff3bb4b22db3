//! Step planning between two schema versions

use serde::Serialize;

use crate::error::Result;
use crate::loader::MigrationSet;
use crate::migration::Direction;

/// One migration entry to run, and the version recorded once it commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub number: u32,
    pub direction: Direction,
    pub name: String,
    pub version_after: u32,
}

/// Ordered steps taking the schema from one version to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub from: u32,
    pub to: u32,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Build the step list from `from` to `to`.
    ///
    /// Going up runs `up(from + 1) ..= up(to)`; going down runs
    /// `down(from) ..= down(to + 1)`. Every entry the plan touches must be
    /// present in the set, so a plan that would hit a missing entry fails
    /// here rather than halfway through a run.
    pub fn between(set: &MigrationSet, from: u32, to: u32) -> Result<Self> {
        let mut steps = Vec::new();

        if to > from {
            for number in (from + 1)..=to {
                let file = set.require(number, Direction::Up)?;
                steps.push(Step {
                    number,
                    direction: Direction::Up,
                    name: file.name.clone(),
                    version_after: number,
                });
            }
        } else if to < from {
            for number in ((to + 1)..=from).rev() {
                let file = set.require(number, Direction::Down)?;
                steps.push(Step {
                    number,
                    direction: Direction::Down,
                    name: file.name.clone(),
                    version_after: number - 1,
                });
            }
        }

        Ok(Self { from, to, steps })
    }

    pub fn direction(&self) -> Option<Direction> {
        match self.to.cmp(&self.from) {
            std::cmp::Ordering::Greater => Some(Direction::Up),
            std::cmp::Ordering::Less => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn fixture() -> MigrationSet {
        MigrationSet::from_names([
            "001-foo.up.sql",
            "001-foo.down.sql",
            "002-bar.up.sql",
            "002-bar.down.sql",
            "003-baz.up.sql",
        ])
        .unwrap()
    }

    #[test]
    fn test_plan_up() {
        let plan = Plan::between(&fixture(), 0, 2).unwrap();
        assert_eq!(plan.direction(), Some(Direction::Up));
        let numbers: Vec<(u32, u32)> = plan.steps.iter().map(|s| (s.number, s.version_after)).collect();
        assert_eq!(numbers, vec![(1, 1), (2, 2)]);
        assert_eq!(plan.steps[0].name, "001-foo.up.sql");
    }

    #[test]
    fn test_plan_down() {
        let plan = Plan::between(&fixture(), 2, 0).unwrap();
        assert_eq!(plan.direction(), Some(Direction::Down));
        let numbers: Vec<(u32, u32)> = plan.steps.iter().map(|s| (s.number, s.version_after)).collect();
        assert_eq!(numbers, vec![(2, 1), (1, 0)]);
        assert!(plan.steps.iter().all(|s| s.direction == Direction::Down));
    }

    #[test]
    fn test_plan_at_rest() {
        let plan = Plan::between(&fixture(), 2, 2).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.direction(), None);
    }

    #[test]
    fn test_plan_down_from_latest_without_down_entry() {
        let err = Plan::between(&fixture(), 3, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingMigration { number: 3, direction: Direction::Down }
        ));
    }

    #[test]
    fn test_plan_from_version_beyond_set() {
        // persisted version above the discovered maximum
        let err = Plan::between(&fixture(), 5, 1).unwrap_err();
        assert!(matches!(err, Error::MissingMigration { number: 5, .. }));
    }
}
