//! Majority voting over the answers of a chunk.
//!
//! There is no ground truth to compare an answer against. Instead, the most common answer among
//! the responders that did answer is assumed to be correct, and every responder is judged by
//! whether it agrees with it. Scoring is a pure function of the probe outcomes.

use serde_json::Value;
use tally_primitives::{Uid, Verdict};

use crate::probe::ProbeOutcome;

/// The result of scoring one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkScore {
    /// The most common answer.
    pub majority: Value,
    /// Number of successful outcomes that agree with the majority.
    pub support: usize,
    /// Number of successful outcomes.
    pub responses: usize,
    /// One verdict per successful outcome, in outcome order.
    pub verdicts: Vec<(Uid, Verdict)>,
}

impl ChunkScore {
    /// Fraction of the responses that agree with the majority.
    pub fn majority_share(&self) -> f64 {
        self.support as f64 / self.responses as f64
    }
}

/// Returns the most frequent value and its number of occurrences.
///
/// Ties are broken in favor of the value that was encountered first. Returns `None` if `values`
/// is empty.
pub fn majority<'a, I>(values: I) -> Option<(&'a Value, usize)>
where
    I: IntoIterator<Item = &'a Value>,
{
    // values are not hashable, and chunks are small
    let mut tally: Vec<(&Value, usize)> = Vec::new();

    for value in values {
        match tally.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }

    tally.into_iter().fold(None, |best, (value, count)| match best {
        Some((_, best_count)) if best_count >= count => best,
        _ => Some((value, count)),
    })
}

/// Scores the outcomes of a chunk.
///
/// Failed outcomes neither vote nor receive a verdict. Returns `None` if no outcome succeeded.
pub fn score_chunk(outcomes: &[ProbeOutcome]) -> Option<ChunkScore> {
    let successes = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            ProbeOutcome::Success { uid, latency, value } => Some((*uid, *latency, value)),
            ProbeOutcome::Failure { .. } => None,
        })
        .collect::<Vec<_>>();

    let (majority, support) = majority(successes.iter().map(|(_, _, value)| *value))?;

    let verdicts = successes
        .iter()
        .map(|(uid, latency, value)| (*uid, Verdict::new(*latency, *value == majority)))
        .collect();

    Some(ChunkScore { majority: majority.clone(), support, responses: successes.len(), verdicts })
}
