//! Two-step composite writes
//!
//! A composite action is a primary operation plus an optional secondary one
//! that depends on the primary's output. The secondary step declares what
//! its failure means for the action as a whole. Nothing is rolled back: the
//! store has no multi-record transaction.

use crate::error::EngineError;
use crate::Result;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Secondary failure fails the whole action.
    AbortAll,
    /// Secondary failure is reported alongside a successful primary.
    ReportButContinue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<S> {
    Completed(S),
    Failed(String),
    NotRun,
}

impl<S> StepOutcome<S> {
    pub fn completed(&self) -> Option<&S> {
        match self {
            StepOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            StepOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SagaOutcome<P, S> {
    pub primary: P,
    pub secondary: StepOutcome<S>,
}

#[derive(Debug, Clone, Copy)]
struct SecondaryStep {
    name: &'static str,
    policy: FailurePolicy,
}

#[derive(Debug, Clone, Copy)]
pub struct Saga {
    primary: &'static str,
    secondary: Option<SecondaryStep>,
}

impl Saga {
    pub fn new(primary: &'static str) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn then(mut self, name: &'static str, policy: FailurePolicy) -> Self {
        self.secondary = Some(SecondaryStep { name, policy });
        self
    }

    pub fn policy(&self) -> Option<FailurePolicy> {
        self.secondary.map(|s| s.policy)
    }

    /// Run the primary step, then the secondary if one is declared and the
    /// builder returns a future for it. The builder sees the primary's
    /// output; returning `None` skips the step.
    pub async fn run<P, S, PF, SB, SF>(&self, primary: PF, secondary: SB) -> Result<SagaOutcome<P, S>>
    where
        PF: Future<Output = Result<P>>,
        SB: FnOnce(&P) -> Option<SF>,
        SF: Future<Output = Result<S>>,
    {
        let primary_output = primary.await?;
        debug!(step = self.primary, "Primary step completed");

        let Some(step) = self.secondary else {
            return Ok(SagaOutcome {
                primary: primary_output,
                secondary: StepOutcome::NotRun,
            });
        };

        let Some(future) = secondary(&primary_output) else {
            return Ok(SagaOutcome {
                primary: primary_output,
                secondary: StepOutcome::NotRun,
            });
        };

        match future.await {
            Ok(value) => {
                debug!(step = step.name, "Secondary step completed");
                Ok(SagaOutcome {
                    primary: primary_output,
                    secondary: StepOutcome::Completed(value),
                })
            }
            Err(e) => match step.policy {
                FailurePolicy::AbortAll => Err(EngineError::SecondaryEffect(format!(
                    "{} succeeded but {} failed: {}",
                    self.primary, step.name, e
                ))),
                FailurePolicy::ReportButContinue => {
                    warn!(
                        primary = self.primary,
                        secondary = step.name,
                        error = %e,
                        "Secondary step failed, keeping primary result"
                    );
                    Ok(SagaOutcome {
                        primary: primary_output,
                        secondary: StepOutcome::Failed(e.to_string()),
                    })
                }
            },
        }
    }
}
