//! Bootstrap step descriptors and the plan builder.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, BootstrapResult};

/// An opaque executable action. Exit code zero is success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepAction {
    /// A command line run through `sh -c`.
    Shell { command: String },
    /// A program invoked directly with arguments.
    Exec { program: String, args: Vec<String> },
}

impl StepAction {
    pub fn shell(command: impl Into<String>) -> Self {
        StepAction::Shell {
            command: command.into(),
        }
    }

    pub fn exec<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StepAction::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::Shell { command } => f.write_str(command),
            StepAction::Exec { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// One step of the first-boot sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStep {
    pub name: String,
    pub action: StepAction,
    /// Names of earlier steps this one relies on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Safe to run more than once with the same end state.
    #[serde(default)]
    pub idempotent: bool,
    /// Post-condition probe. For idempotent steps, a zero exit skips the step.
    #[serde(default)]
    pub check: Option<StepAction>,
}

impl BootstrapStep {
    /// A non-idempotent step: always runs.
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            depends_on: Vec::new(),
            idempotent: false,
            check: None,
        }
    }

    pub fn shell(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, StepAction::shell(command))
    }

    /// Mark the step idempotent. Without a check it is simply re-run.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Mark the step idempotent and skip it when `check` exits zero.
    pub fn skip_if(mut self, check: StepAction) -> Self {
        self.idempotent = true;
        self.check = Some(check);
        self
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }
}

/// A validated, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPlan {
    steps: Vec<BootstrapStep>,
}

impl BootstrapPlan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn steps(&self) -> &[BootstrapStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Accumulates steps in authored order and validates them on `build`.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    steps: Vec<BootstrapStep>,
}

impl PlanBuilder {
    pub fn step(mut self, step: BootstrapStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = BootstrapStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Check names are unique and every dependency names an earlier step.
    pub fn build(self) -> BootstrapResult<BootstrapPlan> {
        let mut position: HashMap<&str, usize> = HashMap::new();

        for (i, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(BootstrapError::Plan(format!("step {} has no name", i + 1)));
            }
            for dep in &step.depends_on {
                match position.get(dep.as_str()) {
                    Some(_) => {}
                    None if self.steps.iter().any(|s| &s.name == dep) => {
                        return Err(BootstrapError::Plan(format!(
                            "step '{}' depends on '{dep}', which runs after it",
                            step.name
                        )));
                    }
                    None => {
                        return Err(BootstrapError::Plan(format!(
                            "step '{}' depends on unknown step '{dep}'",
                            step.name
                        )));
                    }
                }
            }
            if position.insert(step.name.as_str(), i).is_some() {
                return Err(BootstrapError::Plan(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }

        Ok(BootstrapPlan { steps: self.steps })
    }
}
