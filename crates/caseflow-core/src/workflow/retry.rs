//! Retry policy for step tool calls.
//!
//! Stateless: the attempt count lives on the step's `StepResult`, so
//! re-entering the step loop never grants extra attempts.

use caseflow_types::workflow::WorkflowStep;

pub struct RetryPolicy;

impl RetryPolicy {
    /// Total tool invocations allowed for a step.
    pub fn max_attempts(step: &WorkflowStep) -> u32 {
        if step.retry_on_failure { 2 } else { 1 }
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn should_retry(step: &WorkflowStep, attempts_made: u32) -> bool {
        attempts_made < Self::max_attempts(step)
    }
}
