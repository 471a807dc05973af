use crate::update::error::UpdateError;

/// Compares the database's applied revision with what this build knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGate {
    pub watermark: u32,
    pub target: u32,
}

impl VersionGate {
    pub fn new(watermark: u32, target: u32) -> Self {
        Self { watermark, target }
    }

    /// Refuse to run against a database newer than this build
    pub fn check(&self) -> Result<(), UpdateError> {
        if self.watermark > self.target {
            return Err(UpdateError::Downgrade {
                watermark: self.watermark,
                target: self.target,
            });
        }
        Ok(())
    }

    pub fn is_update_available(&self) -> bool {
        self.watermark < self.target
    }
}
