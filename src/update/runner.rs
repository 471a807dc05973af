use crate::config::SystemSettings;
use crate::db::{ConfigStore, Database};
use crate::progress::RevisionReporter;
use crate::update::error::UpdateError;
use crate::update::gate::VersionGate;
use crate::update::registry::Registry;
use crate::update::step::{Step, StepContext};
use crate::update::watermark::{read_watermark, write_watermark};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Gating,
    Running(u32),
    Committing(u32),
    Succeeded,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Gating => write!(f, "gating"),
            RunState::Running(r) => write!(f, "running r{}", r),
            RunState::Committing(r) => write!(f, "committing r{}", r),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Watermark when the run started
    pub from: u32,
    /// Watermark when the run finished
    pub to: u32,
    pub applied: Vec<u32>,
    pub statements_executed: usize,
}

/// Applies pending update steps in ascending order, recording the watermark
/// after each one. Stops at the first failure, leaving the watermark at the
/// last revision that fully completed.
pub struct Runner<'a> {
    registry: &'a Registry,
    db: &'a mut dyn Database,
    config: &'a mut dyn ConfigStore,
    settings: &'a SystemSettings,
    watermark_key: &'a str,
    reporter: RevisionReporter,
    state: RunState,
}

impl<'a> Runner<'a> {
    pub fn new(
        registry: &'a Registry,
        db: &'a mut dyn Database,
        config: &'a mut dyn ConfigStore,
        settings: &'a SystemSettings,
        watermark_key: &'a str,
    ) -> Self {
        Self {
            registry,
            db,
            config,
            settings,
            watermark_key,
            reporter: RevisionReporter::silent(),
            state: RunState::Idle,
        }
    }

    pub fn with_reporter(mut self, reporter: RevisionReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(&mut self) -> Result<RunReport, UpdateError> {
        let started = Instant::now();
        self.transition(RunState::Gating);

        let watermark = match read_watermark(&mut *self.config, self.watermark_key).await {
            Ok(watermark) => watermark,
            Err(source) => return Err(self.fail(UpdateError::WatermarkRead { source })),
        };

        let gate = VersionGate::new(watermark, self.registry.target());
        if let Err(e) = gate.check() {
            return Err(self.fail(e));
        }

        let registry = self.registry;
        let pending: Vec<&Step> = registry.pending(watermark).collect();
        let mut report = RunReport {
            from: watermark,
            to: watermark,
            applied: Vec::new(),
            statements_executed: 0,
        };

        if pending.is_empty() {
            info!("Database is up to date at revision {}", watermark);
            self.reporter.up_to_date(watermark);
            self.transition(RunState::Succeeded);
            return Ok(report);
        }

        self.reporter
            .start_run(watermark, registry.target(), pending.len());

        for step in pending {
            let revision = step.revision;
            self.transition(RunState::Running(revision));
            self.reporter.start_revision(revision, step.description);
            info!("Applying database update r{}: {}", revision, step.description);

            let step_started = Instant::now();
            let executed = match self.apply_step(step).await {
                Ok(executed) => executed,
                Err(e) => {
                    self.reporter.fail_revision(revision, &e);
                    return Err(self.fail(e));
                }
            };

            self.transition(RunState::Committing(revision));
            if let Err(source) =
                write_watermark(&mut *self.config, self.watermark_key, revision).await
            {
                let e = UpdateError::WatermarkPersist { revision, source };
                self.reporter.fail_revision(revision, &e);
                return Err(self.fail(e));
            }

            self.reporter
                .complete_revision(revision, step_started.elapsed(), executed);
            report.applied.push(revision);
            report.statements_executed += executed;
            report.to = revision;
        }

        self.transition(RunState::Succeeded);
        self.reporter
            .run_summary(started.elapsed(), report.applied.len(), report.to);

        Ok(report)
    }

    /// Run the step body, then the statements it returned, in order
    async fn apply_step(&mut self, step: &Step) -> Result<usize, UpdateError> {
        let revision = step.revision;

        let mut ctx = StepContext {
            revision,
            db: &mut *self.db,
            config: &mut *self.config,
            settings: self.settings,
        };
        let outcome = (step.apply)(&mut ctx).await;
        drop(ctx);
        let result = outcome.map_err(|e| UpdateError::from_step(revision, e))?;

        let statements = result.statements();
        for sql in statements {
            self.db
                .execute(sql)
                .await
                .map_err(|source| UpdateError::StatementExecution {
                    revision,
                    statement: Some(sql.clone()),
                    source,
                })?;
        }

        Ok(statements.len())
    }

    fn transition(&mut self, next: RunState) {
        debug!("Update run: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: UpdateError) -> UpdateError {
        self.transition(RunState::Failed);
        error
    }
}
