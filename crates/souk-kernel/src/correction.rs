//! Bounded self-correcting generation loop.
//!
//! Both product matching and order-query generation follow the same shape:
//! ask the generator for a candidate, validate or execute it, and on failure
//! feed the failure text back into the next generation attempt. The loop is
//! sequential and bounded; exhausting it yields a terminal failure carrying
//! the last error so the caller can surface a user-safe message instead.

use async_trait::async_trait;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of assessing one candidate.
#[derive(Debug)]
pub enum Verdict<T> {
    Accept(T),
    /// The candidate was correct but the outcome shape was misleading, e.g.
    /// a mutation that affected rows yet returned none. Settles the loop
    /// without consuming a retry.
    AcceptWithCaveat(T, String),
    /// Structurally wrong candidate; the reason is fed into the next attempt.
    Reject(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug)]
pub enum LoopOutcome<T> {
    Settled(T),
    SettledWithCaveat(T, String),
    Failed(TerminalFailure),
}

impl<T> LoopOutcome<T> {
    pub fn settled(self) -> Option<T> {
        match self {
            LoopOutcome::Settled(value) | LoopOutcome::SettledWithCaveat(value, _) => Some(value),
            LoopOutcome::Failed(_) => None,
        }
    }
}

/// One call site of the loop: a generator plus its validator/executor.
#[async_trait]
pub trait CorrectionStep {
    type Candidate: Send;
    type Output: Send;

    /// Produce a candidate. `last_error` is `None` on the first attempt and
    /// the previous rejection reason afterwards.
    async fn generate(&mut self, last_error: Option<&str>) -> Result<Self::Candidate, String>;

    async fn assess(&mut self, candidate: Self::Candidate) -> Verdict<Self::Output>;
}

/// Run `step` for at most `max_attempts` generate calls. A generation error
/// counts as an attempt just like a rejected candidate.
pub async fn run_bounded<S>(step: &mut S, max_attempts: u32) -> LoopOutcome<S::Output>
where
    S: CorrectionStep + Send,
{
    let max_attempts = max_attempts.max(1);
    let mut last_error: Option<String> = None;

    for attempt in 1..=max_attempts {
        debug!(attempt, max_attempts, "generation attempt");
        let candidate = match step.generate(last_error.as_deref()).await {
            Ok(candidate) => candidate,
            Err(err) => {
                debug!(attempt, error = %err, "generation failed");
                last_error = Some(err);
                continue;
            }
        };
        match step.assess(candidate).await {
            Verdict::Accept(output) => return LoopOutcome::Settled(output),
            Verdict::AcceptWithCaveat(output, note) => {
                debug!(attempt, note = %note, "candidate accepted with caveat");
                return LoopOutcome::SettledWithCaveat(output, note);
            }
            Verdict::Reject(reason) => {
                debug!(attempt, reason = %reason, "candidate rejected");
                last_error = Some(reason);
            }
        }
    }

    LoopOutcome::Failed(TerminalFailure {
        attempts: max_attempts,
        last_error: last_error.unwrap_or_else(|| "no attempts were made".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        generate_calls: u32,
        accept_on: Option<u32>,
        caveat_on: Option<u32>,
        seen_errors: Vec<Option<String>>,
    }

    impl Scripted {
        fn rejecting() -> Self {
            Scripted {
                generate_calls: 0,
                accept_on: None,
                caveat_on: None,
                seen_errors: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CorrectionStep for Scripted {
        type Candidate = u32;
        type Output = u32;

        async fn generate(&mut self, last_error: Option<&str>) -> Result<u32, String> {
            self.generate_calls += 1;
            self.seen_errors.push(last_error.map(|e| e.to_string()));
            Ok(self.generate_calls)
        }

        async fn assess(&mut self, candidate: u32) -> Verdict<u32> {
            if self.caveat_on == Some(candidate) {
                return Verdict::AcceptWithCaveat(candidate, "no rows returned".to_string());
            }
            if self.accept_on == Some(candidate) {
                return Verdict::Accept(candidate);
            }
            Verdict::Reject(format!("candidate {candidate} is malformed"))
        }
    }

    #[tokio::test]
    async fn always_failing_step_exhausts_exactly_max_attempts() {
        let mut step = Scripted::rejecting();
        let outcome = run_bounded(&mut step, 3).await;
        assert_eq!(step.generate_calls, 3);
        match outcome {
            LoopOutcome::Failed(failure) => {
                assert_eq!(failure.attempts, 3);
                assert_eq!(failure.last_error, "candidate 3 is malformed");
            }
            _ => panic!("expected terminal failure"),
        }
    }

    #[tokio::test]
    async fn first_attempt_sees_no_prior_error() {
        let mut step = Scripted {
            accept_on: Some(2),
            ..Scripted::rejecting()
        };
        let outcome = run_bounded(&mut step, 3).await;
        assert_eq!(outcome.settled(), Some(2));
        assert_eq!(step.seen_errors[0], None);
        assert_eq!(
            step.seen_errors[1].as_deref(),
            Some("candidate 1 is malformed")
        );
    }

    #[tokio::test]
    async fn accept_short_circuits_remaining_attempts() {
        let mut step = Scripted {
            accept_on: Some(1),
            ..Scripted::rejecting()
        };
        let outcome = run_bounded(&mut step, 3).await;
        assert_eq!(outcome.settled(), Some(1));
        assert_eq!(step.generate_calls, 1);
    }

    #[tokio::test]
    async fn caveat_settles_without_consuming_retries() {
        let mut step = Scripted {
            caveat_on: Some(1),
            ..Scripted::rejecting()
        };
        match run_bounded(&mut step, 3).await {
            LoopOutcome::SettledWithCaveat(value, note) => {
                assert_eq!(value, 1);
                assert_eq!(note, "no rows returned");
            }
            _ => panic!("expected caveat outcome"),
        }
        assert_eq!(step.generate_calls, 1);
    }

    #[tokio::test]
    async fn zero_max_attempts_still_runs_once() {
        let mut step = Scripted::rejecting();
        let outcome = run_bounded(&mut step, 0).await;
        assert_eq!(step.generate_calls, 1);
        assert!(matches!(outcome, LoopOutcome::Failed(_)));
    }
}
