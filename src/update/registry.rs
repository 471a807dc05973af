use crate::update::step::Step;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Database update r{0} is registered more than once")]
    DuplicateRevision(u32),

    #[error("Database update r{revision} is beyond the last known revision r{target}")]
    BeyondTarget { revision: u32, target: u32 },
}

/// Ordered catalog of update steps up to a target revision.
///
/// Revision numbers may have gaps (withdrawn updates); they are never reused.
#[derive(Debug)]
pub struct Registry {
    target: u32,
    steps: Vec<Step>,
}

impl Registry {
    pub fn new(target: u32, mut steps: Vec<Step>) -> Result<Self, RegistryError> {
        steps.sort_by_key(|s| s.revision);

        if let Some(pair) = steps.windows(2).find(|w| w[0].revision == w[1].revision) {
            return Err(RegistryError::DuplicateRevision(pair[0].revision));
        }

        if let Some(step) = steps.iter().find(|s| s.revision > target) {
            return Err(RegistryError::BeyondTarget {
                revision: step.revision,
                target,
            });
        }

        Ok(Self { target, steps })
    }

    /// Highest revision this build knows about (`LAST_UPDATE`)
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Highest registered revision, if any
    pub fn last_revision(&self) -> Option<u32> {
        self.steps.last().map(|s| s.revision)
    }

    /// Steps strictly after `watermark`, ascending
    pub fn pending(&self, watermark: u32) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.revision > watermark)
    }

    pub fn get(&self, revision: u32) -> Option<&Step> {
        self.steps
            .binary_search_by_key(&revision, |s| s.revision)
            .ok()
            .map(|idx| &self.steps[idx])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
