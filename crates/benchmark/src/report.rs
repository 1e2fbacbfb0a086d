//! The result of a benchmarking pass.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tally_primitives::{BlockRange, Network, Uid, Verdict};

/// One verdict for a responder, as observed in a single chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub uid: Uid,
    pub hotkey: String,
    pub network: Network,
    pub cohort: usize,
    pub chunk: usize,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// How a scored chunk voted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub network: Network,
    pub cohort: usize,
    pub chunk: usize,
    /// The blocks covered by the chunk's query.
    pub range: BlockRange,
    pub members: usize,
    /// Number of members with a usable answer.
    pub responses: usize,
    /// Number of answers equal to the majority.
    pub support: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub majority: Option<Value>,
}

impl ChunkSummary {
    /// Fraction of the answers that agree with the majority, or `None` if nobody answered.
    pub fn majority_share(&self) -> Option<f64> {
        (self.responses > 0).then(|| self.support as f64 / self.responses as f64)
    }

    fn key(&self) -> (&Network, usize, usize) {
        (&self.network, self.cohort, self.chunk)
    }
}

/// Anything the pass skipped or could not evaluate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    ClaimRejected { uid: Uid, reason: String },
    NetworkSkipped { network: Network, reason: String },
    CohortSkipped { network: Network, cohort: usize, reason: String },
    ProbeFailed { uid: Uid, network: Network, cohort: usize, chunk: usize, reason: String },
    NoAnswers { network: Network, cohort: usize, chunk: usize },
    ChunkAbandoned { network: Network, cohort: usize, chunk: usize, reason: String },
}

/// How multiple observations of the same responder are combined into one verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerdictFold {
    /// The last observation wins.
    #[default]
    Latest,
    /// The responder agrees only if it agreed in every chunk. Latency is the mean.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// Observations ordered by network, cohort and chunk, then by chunk member order.
    pub observations: Vec<Observation>,
    pub chunks: Vec<ChunkSummary>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the pass was cancelled before every chunk was scored.
    pub cancelled: bool,
}

impl PassReport {
    /// Per-responder verdicts, keeping the last observation of each responder.
    ///
    /// Responders without any successful probe are absent.
    pub fn verdicts(&self) -> BTreeMap<Uid, Verdict> {
        self.fold(VerdictFold::Latest)
    }

    pub fn fold(&self, fold: VerdictFold) -> BTreeMap<Uid, Verdict> {
        fold_observations(self.observations.iter(), fold)
    }

    /// Like [`verdicts`](Self::verdicts), but ignores chunks whose majority share is below
    /// `threshold`.
    pub fn verdicts_with_consensus(&self, threshold: f64) -> BTreeMap<Uid, Verdict> {
        let trusted = self
            .chunks
            .iter()
            .filter(|c| c.majority_share().is_some_and(|share| share >= threshold))
            .map(ChunkSummary::key)
            .collect::<HashSet<_>>();

        let observations = self
            .observations
            .iter()
            .filter(|o| trusted.contains(&(&o.network, o.cohort, o.chunk)));

        fold_observations(observations, VerdictFold::Latest)
    }

    pub(crate) fn sort(&mut self) {
        // stable, so observations of a chunk keep their member order
        self.observations.sort_by(|a, b| {
            (&a.network, a.cohort, a.chunk).cmp(&(&b.network, b.cohort, b.chunk))
        });
        self.chunks.sort_by(|a, b| a.key().cmp(&b.key()));
    }
}

fn fold_observations<'a>(
    observations: impl Iterator<Item = &'a Observation>,
    fold: VerdictFold,
) -> BTreeMap<Uid, Verdict> {
    match fold {
        VerdictFold::Latest => observations.map(|o| (o.uid, o.verdict)).collect(),
        VerdictFold::Strict => {
            let mut acc: BTreeMap<Uid, (Duration, u32, bool)> = BTreeMap::new();

            for o in observations {
                let (total, count, agreement) =
                    acc.entry(o.uid).or_insert((Duration::ZERO, 0, true));
                *total += o.verdict.latency;
                *count += 1;
                *agreement &= o.verdict.agreement;
            }

            acc.into_iter()
                .map(|(uid, (total, count, agreement))| {
                    (uid, Verdict::new(total / count, agreement))
                })
                .collect()
        }
    }
}
