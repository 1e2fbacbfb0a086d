use rand::seq::SliceRandom;
use rand::Rng;
use tally_primitives::{Network, ResponderClaim};

use crate::cohort::Cohort;

/// A bounded batch of cohort members probed with one shared query.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub network: Network,
    /// Label of the cohort the chunk was taken from.
    pub cohort: usize,
    /// Position of the chunk within its cohort.
    pub index: usize,
    pub members: Vec<ResponderClaim>,
}

/// Splits cohorts into chunks of at most `chunk_size` members.
#[derive(Debug, Clone, Copy)]
pub struct ChunkScheduler {
    chunk_size: usize,
}

impl ChunkScheduler {
    /// A `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    /// Shuffles the cohort members and splits them into contiguous chunks. Only the last chunk
    /// may be smaller than the chunk size.
    pub fn schedule<R: Rng + ?Sized>(&self, cohort: &Cohort, rng: &mut R) -> Vec<Chunk> {
        let mut members = cohort.members.clone();
        members.shuffle(rng);

        members
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(index, members)| Chunk {
                network: cohort.network.clone(),
                cohort: cohort.label,
                index,
                members: members.to_vec(),
            })
            .collect()
    }
}
