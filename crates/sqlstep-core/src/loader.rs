//! Discovery and validation of migration sets

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::migration::{Direction, MigrationFile};
use crate::source::MigrationSource;

/// Indexed up and down entries of one source
///
/// Built fresh by every [`load`]; nothing is cached between runs.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    up: BTreeMap<u32, MigrationFile>,
    down: BTreeMap<u32, MigrationFile>,
    max_number: u32,
}

impl MigrationSet {
    /// Index entry names and validate the result.
    ///
    /// Names are visited in sorted order so the first reported error does
    /// not depend on listing order.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<S> = names.into_iter().collect();
        names.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

        let mut set = Self::default();
        for name in &names {
            let name = name.as_ref();
            match MigrationFile::parse(name)? {
                Some(file) => set.insert(file)?,
                None => tracing::debug!("Skipping non-migration entry {}", name),
            }
        }

        set.validate()?;
        Ok(set)
    }

    fn insert(&mut self, file: MigrationFile) -> Result<()> {
        self.max_number = self.max_number.max(file.number);

        let index = match file.direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        };
        if let Some(existing) = index.get(&file.number) {
            return Err(Error::DuplicateMigration {
                number: file.number,
                direction: file.direction,
                first: existing.name.clone(),
                second: file.name,
            });
        }
        index.insert(file.number, file);
        Ok(())
    }

    /// Check that every number below the maximum has both an up and a down
    /// entry. The highest migration only needs its up entry.
    pub fn validate(&self) -> Result<()> {
        for number in 1..self.max_number {
            for direction in [Direction::Up, Direction::Down] {
                if self.get(number, direction).is_none() {
                    return Err(Error::MissingMigration { number, direction });
                }
            }
        }
        Ok(())
    }

    /// Highest discovered migration number, 0 when the set is empty
    pub fn max_number(&self) -> u32 {
        self.max_number
    }

    pub fn get(&self, number: u32, direction: Direction) -> Option<&MigrationFile> {
        match direction {
            Direction::Up => self.up.get(&number),
            Direction::Down => self.down.get(&number),
        }
    }

    /// Look up an entry the caller needs to run
    pub fn require(&self, number: u32, direction: Direction) -> Result<&MigrationFile> {
        self.get(number, direction)
            .ok_or(Error::MissingMigration { number, direction })
    }

    /// Every indexed entry, ordered by number with up before down
    pub fn files(&self) -> impl Iterator<Item = &MigrationFile> {
        let mut files: Vec<&MigrationFile> = self.up.values().chain(self.down.values()).collect();
        files.sort_by_key(|f| (f.number, f.direction));
        files.into_iter()
    }

    pub fn len(&self) -> usize {
        self.up.len() + self.down.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// List a source and build a validated [`MigrationSet`] from it
pub async fn load<S>(source: &S) -> Result<MigrationSet>
where
    S: MigrationSource + ?Sized,
{
    let names = source.list().await?;
    let set = MigrationSet::from_names(names)?;
    tracing::debug!(
        "Loaded {} migration entries from {} (latest {})",
        set.len(),
        source.describe(),
        set.max_number()
    );
    Ok(set)
}
