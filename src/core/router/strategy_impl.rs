//! Routing strategy implementations
//!
//! Every strategy is a pure function over a snapshot of candidate metrics.
//! Only simple-shuffle (and least-busy tie breaking) draws from the RNG, so
//! the other strategies are deterministic for a given snapshot.

use super::config::RoutingStrategy;
use super::keys::WindowKind;
use super::usage::UsageSnapshot;
use rand::Rng;

/// Latency samples a deployment needs before its own average is trusted
pub const MIN_LATENCY_SAMPLES: u64 = 3;

/// What a strategy knows about one candidate
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandidateMetrics {
    pub weight: u32,
    pub in_flight: u32,
    pub avg_latency_us: u64,
    pub latency_samples: u64,
    pub usage: UsageSnapshot,
    /// Limits indexed like [`WindowKind::ALL`]
    pub limits: [Option<u64>; 4],
    /// Cost per token, `None` when no pricing is configured
    pub unit_cost: Option<f64>,
}

impl CandidateMetrics {
    fn limit(&self, window: WindowKind) -> Option<u64> {
        WindowKind::ALL
            .iter()
            .position(|w| *w == window)
            .and_then(|i| self.limits[i])
    }

    /// Remaining share of a window's limit, 1.0 when unlimited
    fn headroom(&self, window: WindowKind) -> f64 {
        match self.limit(window) {
            Some(limit) if limit > 0 => {
                let remaining = limit.saturating_sub(self.usage.get(window));
                remaining as f64 / limit as f64
            }
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

/// Pick one candidate; `None` only when `candidates` is empty
pub fn select<R: Rng + ?Sized>(
    strategy: RoutingStrategy,
    candidates: &[CandidateMetrics],
    rng: &mut R,
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(0);
    }
    let index = match strategy {
        RoutingStrategy::SimpleShuffle | RoutingStrategy::ProviderBudget => {
            weighted_random(candidates, rng)
        }
        RoutingStrategy::LeastBusy => least_busy(candidates, rng),
        RoutingStrategy::LatencyBased => lowest_latency(candidates),
        RoutingStrategy::UsageBased => most_headroom(candidates, |c| c.headroom(WindowKind::Tpm)),
        RoutingStrategy::UsageBasedV2 => most_headroom(candidates, |c| {
            WindowKind::ALL
                .iter()
                .map(|w| c.headroom(*w))
                .fold(1.0, f64::min)
        }),
        RoutingStrategy::CostBased => lowest_cost(candidates),
    };
    Some(index)
}

/// Weighted random selection (simple-shuffle)
///
/// Higher weight = higher probability of selection; uniform when every
/// weight is zero.
pub fn weighted_random<R: Rng + ?Sized>(candidates: &[CandidateMetrics], rng: &mut R) -> usize {
    let total_weight: u64 = candidates.iter().map(|c| u64::from(c.weight)).sum();
    if total_weight == 0 {
        return rng.gen_range(0..candidates.len());
    }

    let mut point = rng.gen_range(0..total_weight);
    for (i, candidate) in candidates.iter().enumerate() {
        let weight = u64::from(candidate.weight);
        if point < weight {
            return i;
        }
        point -= weight;
    }
    candidates.len() - 1
}

/// Fewest in-flight calls; ties broken by weighted shuffle
pub fn least_busy<R: Rng + ?Sized>(candidates: &[CandidateMetrics], rng: &mut R) -> usize {
    let min_in_flight = candidates.iter().map(|c| c.in_flight).min().unwrap_or(0);
    let tied: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.in_flight == min_in_flight)
        .map(|(i, _)| i)
        .collect();

    if tied.len() == 1 {
        return tied[0];
    }
    let tied_metrics: Vec<CandidateMetrics> = tied.iter().map(|&i| candidates[i]).collect();
    tied[weighted_random(&tied_metrics, rng)]
}

/// Lowest latency average
///
/// Candidates with fewer than [`MIN_LATENCY_SAMPLES`] samples score as the
/// mean of their warmed-up peers, so a new deployment is neither starved nor
/// flooded. Ties go to the earlier candidate.
pub fn lowest_latency(candidates: &[CandidateMetrics]) -> usize {
    let warmed: Vec<u64> = candidates
        .iter()
        .filter(|c| c.latency_samples >= MIN_LATENCY_SAMPLES)
        .map(|c| c.avg_latency_us)
        .collect();
    let peer_mean = if warmed.is_empty() {
        0
    } else {
        warmed.iter().sum::<u64>() / warmed.len() as u64
    };

    let mut best = 0;
    let mut best_latency = u64::MAX;
    for (i, candidate) in candidates.iter().enumerate() {
        let latency = if candidate.latency_samples >= MIN_LATENCY_SAMPLES {
            candidate.avg_latency_us
        } else {
            peer_mean
        };
        if latency < best_latency {
            best_latency = latency;
            best = i;
        }
    }
    best
}

fn most_headroom(candidates: &[CandidateMetrics], score: impl Fn(&CandidateMetrics) -> f64) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let s = score(candidate);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

/// Lowest per-token cost; unpriced candidates rank last
pub fn lowest_cost(candidates: &[CandidateMetrics]) -> usize {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let cost = candidate.unit_cost.unwrap_or(f64::INFINITY);
        if cost < best_cost {
            best_cost = cost;
            best = i;
        }
    }
    best
}
