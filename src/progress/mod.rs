pub mod revision_reporter;

pub use revision_reporter::RevisionReporter;
