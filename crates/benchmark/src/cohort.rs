//! Grouping of responders into comparison cohorts.
//!
//! Responders of the same network are clustered by their claimed coverage, treating every claim
//! as a point `(start, end)` on the plane. Each resulting cluster is a [`Cohort`] whose members
//! will be probed with the same queries. The probed blocks must lie within the coverage of every
//! member, so the cohort's safe range takes the *minimum* of both bounds.

use std::collections::{BTreeMap, BTreeSet};

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tally_primitives::claim::InvalidClaim;
use tally_primitives::{BlockRange, Network, ResponderClaim, Uid};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "cohort";

/// Convergence threshold of the k-means iterations, in blocks.
const KMEANS_TOLERANCE: f64 = 1e-4;
const KMEANS_MAX_ITERATIONS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CohortError {
    #[error("{distinct} distinct coverage point(s) cannot form {clusters} clusters")]
    NotEnoughDistinctPoints { distinct: usize, clusters: usize },

    #[error("coverage clustering failed: {0}")]
    Clustering(String),
}

/// A group of responders of one network with similar claimed coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub network: Network,
    /// Cluster label. Only unique among the cohorts of one network within a single pass.
    pub label: usize,
    /// The range of blocks that every member claims to serve.
    pub safe_range: BlockRange,
    pub members: Vec<ResponderClaim>,
}

impl Cohort {
    /// Creates a cohort from its members. Returns `None` if `members` is empty.
    pub fn new(network: Network, label: usize, members: Vec<ResponderClaim>) -> Option<Self> {
        let safe_range = safe_range(&members)?;
        Some(Self { network, label, safe_range, members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Computes `[min(start), min(end)]` over the coverage of all `members`.
pub fn safe_range(members: &[ResponderClaim]) -> Option<BlockRange> {
    let start = members.iter().map(|m| m.coverage.start).min()?;
    let end = members.iter().map(|m| m.coverage.end).min()?;
    Some(BlockRange::new(start, end))
}

/// All cohorts formed for one pass.
#[derive(Debug, Default)]
pub struct CohortSet {
    pub cohorts: BTreeMap<Network, Vec<Cohort>>,
    /// Networks for which no cohort could be formed.
    pub skipped: BTreeMap<Network, CohortError>,
    /// Claims that were excluded before clustering.
    pub rejected: Vec<(Uid, InvalidClaim)>,
}

impl CohortSet {
    pub fn iter(&self) -> impl Iterator<Item = &Cohort> {
        self.cohorts.values().flatten()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CohortBuilder {
    cluster_count: usize,
}

impl CohortBuilder {
    pub fn new(cluster_count: usize) -> Self {
        Self { cluster_count }
    }

    pub fn build(&self, claims: impl IntoIterator<Item = ResponderClaim>) -> CohortSet {
        let mut set = CohortSet::default();

        for (network, claims) in partition_by_network(claims, &mut set.rejected) {
            match self.cluster(&network, claims) {
                Ok(cohorts) => {
                    info!(
                        target: LOG_TARGET,
                        %network,
                        cohorts = cohorts.len(),
                        "Formed cohorts."
                    );
                    set.cohorts.insert(network, cohorts);
                }
                Err(error) => {
                    warn!(target: LOG_TARGET, %network, %error, "Skipping network.");
                    set.skipped.insert(network, error);
                }
            }
        }

        set
    }

    /// Clusters the claims of a single network.
    ///
    /// Every returned cohort is non-empty. Members keep the relative order they had in `claims`.
    pub fn cluster(
        &self,
        network: &Network,
        claims: Vec<ResponderClaim>,
    ) -> Result<Vec<Cohort>, CohortError> {
        let points = claims.iter().map(|c| (c.coverage.start, c.coverage.end)).collect::<Vec<_>>();
        let labels = cluster_labels(&points, self.cluster_count)?;

        let mut groups: BTreeMap<usize, Vec<ResponderClaim>> = BTreeMap::new();
        for (label, claim) in labels.into_iter().zip(claims) {
            groups.entry(label).or_default().push(claim);
        }

        let cohorts = groups
            .into_iter()
            .filter_map(|(label, members)| Cohort::new(network.clone(), label, members))
            .collect::<Vec<_>>();

        for cohort in &cohorts {
            debug!(
                target: LOG_TARGET,
                %network,
                label = cohort.label,
                members = cohort.len(),
                safe_range = %cohort.safe_range,
                "Cohort."
            );
        }

        Ok(cohorts)
    }
}

/// Groups the valid claims by network. Invalid claims are pushed to `rejected`.
fn partition_by_network(
    claims: impl IntoIterator<Item = ResponderClaim>,
    rejected: &mut Vec<(Uid, InvalidClaim)>,
) -> BTreeMap<Network, Vec<ResponderClaim>> {
    let mut networks: BTreeMap<Network, Vec<ResponderClaim>> = BTreeMap::new();

    for claim in claims {
        match claim.validate() {
            Ok(()) => networks.entry(claim.network.clone()).or_default().push(claim),
            Err(error) => {
                warn!(target: LOG_TARGET, uid = claim.uid, %error, "Rejecting claim.");
                rejected.push((claim.uid, error));
            }
        }
    }

    networks
}

/// Assigns each point to one of `clusters` clusters using k-means.
///
/// Labels are renumbered in order of first appearance, so the first point always gets label `0`.
fn cluster_labels(points: &[(u64, u64)], clusters: usize) -> Result<Vec<usize>, CohortError> {
    if clusters == 0 {
        return Err(CohortError::Clustering("cluster count must be at least 1".to_string()));
    }

    let distinct = points.iter().collect::<BTreeSet<_>>().len();
    if distinct < clusters {
        return Err(CohortError::NotEnoughDistinctPoints { distinct, clusters });
    }

    if clusters == 1 {
        return Ok(vec![0; points.len()]);
    }

    let records = Array2::from_shape_fn((points.len(), 2), |(row, column)| {
        let (start, end) = points[row];
        if column == 0 {
            start as f64
        } else {
            end as f64
        }
    });

    let dataset = DatasetBase::from(records.clone());
    let model = KMeans::params_with_rng(clusters, StdRng::from_entropy())
        .max_n_iterations(KMEANS_MAX_ITERATIONS)
        .tolerance(KMEANS_TOLERANCE)
        .fit(&dataset)
        .map_err(|e| CohortError::Clustering(e.to_string()))?;

    let assigned: Array1<usize> = model.predict(&records);

    let mut renumbered = BTreeMap::new();
    let labels = assigned
        .iter()
        .map(|raw| {
            let next = renumbered.len();
            *renumbered.entry(*raw).or_insert(next)
        })
        .collect();

    Ok(labels)
}
