use crate::config::SystemSettings;
use crate::db::{ConfigStore, Database};
use crate::schema::StatementBuilder;
use crate::update::error::StepError;
use futures_util::future::LocalBoxFuture;

/// What a step hands back to the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Nothing left to do (already applied, or the step did its work directly)
    NoOp,
    /// Statements the runner executes in order
    Statements(Vec<String>),
}

impl StepResult {
    /// Collect optional statements, dropping the ones a guard skipped
    pub fn from_statements<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Option<String>>,
    {
        let statements: Vec<String> = statements
            .into_iter()
            .filter_map(|s| -> Option<String> { s.into() })
            .collect();
        if statements.is_empty() {
            StepResult::NoOp
        } else {
            StepResult::Statements(statements)
        }
    }

    pub fn statements(&self) -> &[String] {
        match self {
            StepResult::NoOp => &[],
            StepResult::Statements(statements) => statements,
        }
    }
}

impl From<String> for StepResult {
    fn from(sql: String) -> Self {
        StepResult::Statements(vec![sql])
    }
}

impl From<&str> for StepResult {
    fn from(sql: &str) -> Self {
        StepResult::Statements(vec![sql.to_string()])
    }
}

impl From<Option<String>> for StepResult {
    fn from(sql: Option<String>) -> Self {
        sql.map_or(StepResult::NoOp, StepResult::from)
    }
}

impl From<Vec<String>> for StepResult {
    fn from(statements: Vec<String>) -> Self {
        StepResult::from_statements(statements)
    }
}

impl From<Option<Vec<String>>> for StepResult {
    fn from(statements: Option<Vec<String>>) -> Self {
        statements.map_or(StepResult::NoOp, StepResult::from)
    }
}

/// Everything a step may touch while it runs
pub struct StepContext<'a> {
    pub revision: u32,
    pub db: &'a mut dyn Database,
    pub config: &'a mut dyn ConfigStore,
    pub settings: &'a SystemSettings,
}

impl<'a> StepContext<'a> {
    /// Guarded DDL builders over the step's session
    pub fn schema(&mut self) -> StatementBuilder<'_> {
        StatementBuilder::new(&mut *self.db)
    }

    /// Run a statement right away (for repairs whose later checks depend on it)
    pub async fn execute(&mut self, sql: &str) -> Result<u64, StepError> {
        Ok(self.db.execute(sql).await?)
    }

    /// Run a statement a guard produced, if any
    pub async fn execute_optional(&mut self, sql: Option<String>) -> Result<(), StepError> {
        if let Some(sql) = sql {
            self.db.execute(&sql).await?;
        }
        Ok(())
    }

    /// Run a list of statements a guard produced, if any
    pub async fn execute_all(&mut self, statements: Option<Vec<String>>) -> Result<(), StepError> {
        for sql in statements.unwrap_or_default() {
            self.db.execute(&sql).await?;
        }
        Ok(())
    }
}

pub type StepFuture<'a> = LocalBoxFuture<'a, Result<StepResult, StepError>>;

/// An update step body
pub type StepFn = for<'a, 'b> fn(&'a mut StepContext<'b>) -> StepFuture<'a>;

/// One numbered database update
#[derive(Clone, Copy)]
pub struct Step {
    pub revision: u32,
    pub description: &'static str,
    pub apply: StepFn,
}

impl Step {
    pub fn new(revision: u32, description: &'static str, apply: StepFn) -> Self {
        Self {
            revision,
            description,
            apply,
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("revision", &self.revision)
            .field("description", &self.description)
            .finish()
    }
}
