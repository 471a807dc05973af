//! Database update engine: the step catalog, the registry that orders it, and
//! the runner that applies pending steps against the recorded watermark.

pub mod catalog;
pub mod error;
pub mod gate;
pub mod lock;
pub mod registry;
pub mod release;
pub mod runner;
pub mod step;
pub mod watermark;

pub use error::{StepError, UpdateError};
pub use gate::VersionGate;
pub use lock::UpdateLock;
pub use registry::{Registry, RegistryError};
pub use release::{ReleaseChecker, ReleaseError, ReleaseInfo};
pub use runner::{RunReport, RunState, Runner};
pub use step::{Step, StepContext, StepFn, StepFuture, StepResult};
