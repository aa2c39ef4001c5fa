// SPDX-License-Identifier: MIT

//! Reviewer capability for the human checkpoint
//!
//! The interactive gate is a pluggable seam: a [`Reviewer`] maps proposed
//! agent feedback to a decision. Interactive runs use [`ConsoleReviewer`];
//! batch and automated runs plug in a scripted implementation instead of
//! blocking on a terminal.

use std::io::{self, BufRead, Write};

use super::step::StepError;

/// Outcome of reviewing the agent's feedback on a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Let the agent feedback drive the edit step as-is
    AcceptAgentFeedback,
    /// The draft is already correct; finalize it without editing
    DraftIsCorrect,
    /// Replace the agent feedback with this free-text feedback
    Feedback(String),
}

/// Maps proposed agent feedback to a review decision
pub trait Reviewer: Send + Sync {
    fn review(&self, agent_feedback: &str) -> Result<ReviewDecision, StepError>;
}

/// Synchronous console reviewer: one prompt, then at most one follow-up.
/// Blocks the calling thread on stdin; no timeout, by design of the
/// interactive gate.
pub struct ConsoleReviewer;

impl ConsoleReviewer {
    fn read_line() -> Result<String, StepError> {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| StepError::Review(e.to_string()))?;
        Ok(line.trim().to_string())
    }

    fn prompt(text: &str) -> Result<(), StepError> {
        println!("{text}");
        io::stdout()
            .flush()
            .map_err(|e| StepError::Review(e.to_string()))
    }
}

impl Reviewer for ConsoleReviewer {
    fn review(&self, agent_feedback: &str) -> Result<ReviewDecision, StepError> {
        Self::prompt(&format!("Feedback:\n{agent_feedback}"))?;
        Self::prompt("Enter yes if you agree with the agent feedback:")?;
        let first = Self::read_line()?;
        if first.eq_ignore_ascii_case("yes") {
            return Ok(ReviewDecision::AcceptAgentFeedback);
        }

        Self::prompt("Enter no if the draft is already correct, or type your feedback:")?;
        let second = Self::read_line()?;
        if second.eq_ignore_ascii_case("no") {
            return Ok(ReviewDecision::DraftIsCorrect);
        }
        Ok(ReviewDecision::Feedback(second))
    }
}

/// Scripted reviewer for automated runs and tests
pub struct ScriptedReviewer {
    decision: ReviewDecision,
}

impl ScriptedReviewer {
    pub fn new(decision: ReviewDecision) -> Self {
        Self { decision }
    }
}

impl Reviewer for ScriptedReviewer {
    fn review(&self, _agent_feedback: &str) -> Result<ReviewDecision, StepError> {
        Ok(self.decision.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reviewer_returns_decision() {
        let reviewer = ScriptedReviewer::new(ReviewDecision::DraftIsCorrect);
        assert_eq!(
            reviewer.review("looks wrong").unwrap(),
            ReviewDecision::DraftIsCorrect
        );
    }

    #[test]
    fn test_scripted_feedback_decision() {
        let reviewer =
            ScriptedReviewer::new(ReviewDecision::Feedback("rename the entity".to_string()));
        match reviewer.review("anything").unwrap() {
            ReviewDecision::Feedback(text) => assert_eq!(text, "rename the entity"),
            other => panic!("unexpected decision: {other:?}"),
        }
    }
}
