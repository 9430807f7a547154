use std::cmp::Ordering;

pub const MOMENTUM_WEIGHT: f64 = 0.4;
pub const ROE_WEIGHT: f64 = 0.3;
pub const RELATIVE_VOLUME_WEIGHT: f64 = 0.3;

/// A cohort vector sorted once so every member can be ranked against it.
#[derive(Debug, Clone)]
pub struct PercentileTable {
    sorted: Vec<f64>,
}

impl PercentileTable {
    pub fn new(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self { sorted }
    }

    /// Percentile rank (0..=100) of `value`.
    ///
    /// Position of the first sorted element that is `>= value`, scaled by the cohort size; 100
    /// when `value` is above every element. Ties resolve to the earliest position, so a value
    /// equal to the cohort minimum always ranks 0.
    pub fn rank(&self, value: f64) -> f64 {
        match self.sorted.iter().position(|v| *v >= value) {
            Some(idx) => idx as f64 / self.sorted.len() as f64 * 100.0,
            None => 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortMember {
    pub symbol: String,
    pub roe: f64,
    pub momentum_1m: f64,
    pub relative_volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: CohortMember,
    pub composite_score: f64,
}

pub fn composite_score(momentum_pct: f64, roe_pct: f64, relative_volume_pct: f64) -> f64 {
    momentum_pct * MOMENTUM_WEIGHT
        + roe_pct * ROE_WEIGHT
        + relative_volume_pct * RELATIVE_VOLUME_WEIGHT
}

/// Score every member against the whole cohort and order by descending composite score.
///
/// A cohort of one has nothing to be ranked against; its member is treated as the top of every
/// metric and scores 100. Equal scores are ordered by ascending symbol so the ranking does not
/// depend on fetch completion order.
pub fn rank_cohort(cohort: Vec<CohortMember>) -> Vec<ScoredMember> {
    let momentum = PercentileTable::new(&cohort.iter().map(|m| m.momentum_1m).collect::<Vec<_>>());
    let roe = PercentileTable::new(&cohort.iter().map(|m| m.roe).collect::<Vec<_>>());
    let rel_vol =
        PercentileTable::new(&cohort.iter().map(|m| m.relative_volume).collect::<Vec<_>>());

    let sole_member = cohort.len() == 1;
    let mut scored: Vec<ScoredMember> = cohort
        .into_iter()
        .map(|member| {
            if sole_member {
                return ScoredMember {
                    member,
                    composite_score: composite_score(100.0, 100.0, 100.0),
                };
            }
            let composite_score = composite_score(
                momentum.rank(member.momentum_1m),
                roe.rank(member.roe),
                rel_vol.rank(member.relative_volume),
            );
            ScoredMember {
                member,
                composite_score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.member.symbol.cmp(&b.member.symbol))
    });

    scored
}
