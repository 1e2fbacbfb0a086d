use rand::Rng;
use serde::Serialize;
use tally_config::QueryTemplate;
use tally_primitives::{BlockRange, Network};

/// A concrete query sent to the members of a cohort, together with the blocks it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkQuery {
    pub network: Network,
    pub range: BlockRange,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("cohort interval {safe_range} is too narrow to probe {width} blocks")]
    IntervalTooNarrow { safe_range: BlockRange, width: u64 },
}

/// Produces randomized benchmark queries from a query template.
#[derive(Debug, Clone, Copy)]
pub struct QuerySynthesizer<'a> {
    template: &'a QueryTemplate,
    diff: u64,
    max_jitter: u64,
}

impl<'a> QuerySynthesizer<'a> {
    pub fn new(template: &'a QueryTemplate, diff: u64, max_jitter: u64) -> Self {
        Self { template, diff, max_jitter }
    }

    /// Synthesizes a query over `diff - jitter` blocks starting in the upper half of
    /// `safe_range`, with the jitter drawn uniformly from `[0, max_jitter]`.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        network: &Network,
        safe_range: BlockRange,
        rng: &mut R,
    ) -> Result<BenchmarkQuery, QueryError> {
        let jitter = if self.max_jitter == 0 { 0 } else { rng.gen_range(0..=self.max_jitter) };
        let width = self.diff.saturating_sub(jitter);

        let range = probe_range(safe_range, width, rng)?;
        let text = self.template.render(&range);

        Ok(BenchmarkQuery { network: network.clone(), range, text })
    }
}

/// Picks `[block, block + width]` with `block` uniform in `[mid, end - width]`, where `mid` is
/// the midpoint of `safe_range`. The result always lies within `safe_range`.
pub fn probe_range<R: Rng + ?Sized>(
    safe_range: BlockRange,
    width: u64,
    rng: &mut R,
) -> Result<BlockRange, QueryError> {
    let low = safe_range.midpoint();
    let high = safe_range
        .end
        .checked_sub(width)
        .filter(|high| safe_range.is_well_formed() && *high >= low)
        .ok_or(QueryError::IntervalTooNarrow { safe_range, width })?;

    let block = rng.gen_range(low..=high);
    Ok(BlockRange::new(block, block + width))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    use super::*;

    #[test]
    fn degenerate_range_has_a_single_candidate() {
        let template = QueryTemplate::default();
        let synthesizer = QuerySynthesizer::new(&template, 10_000, 0);
        let mut rng = StdRng::seed_from_u64(0);

        let query = synthesizer
            .synthesize(&Network::bitcoin(), BlockRange::new(1_000, 21_000), &mut rng)
            .unwrap();

        assert_eq!(query.range, BlockRange::new(11_000, 21_000));
        assert_eq!(
            query.text,
            "UNWIND range(11000, 21000) AS block_height MATCH (p:Transaction) WHERE \
             p.block_height = block_height RETURN SUM(p.block_height);"
        );
    }

    #[test]
    fn queried_range_stays_inside_safe_range() {
        let template = QueryTemplate::default();
        let synthesizer = QuerySynthesizer::new(&template, 1_000, 100);
        let safe_range = BlockRange::new(500, 40_000);
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..1_000 {
            let query = synthesizer.synthesize(&Network::bitcoin(), safe_range, &mut rng).unwrap();

            assert!(safe_range.contains_range(&query.range));
            assert!(query.range.start >= safe_range.midpoint());
            assert!((900..=1_000).contains(&query.range.width()));
        }
    }

    #[rstest]
    #[case::shorter_than_diff(BlockRange::new(0, 9_999))]
    #[case::upper_half_too_short(BlockRange::new(0, 15_000))]
    #[case::end_below_diff(BlockRange::new(5_000, 5_000))]
    #[case::inverted(BlockRange::new(30_000, 20_000))]
    fn too_narrow(#[case] safe_range: BlockRange) {
        let mut rng = StdRng::seed_from_u64(3);
        assert_matches!(
            probe_range(safe_range, 10_000, &mut rng),
            Err(QueryError::IntervalTooNarrow { width: 10_000, .. })
        );
    }

    #[test]
    fn zero_width_queries_a_single_block() {
        let mut rng = StdRng::seed_from_u64(5);
        let range = probe_range(BlockRange::new(10, 10), 0, &mut rng).unwrap();
        assert_eq!(range, BlockRange::new(10, 10));
    }
}
