use super::*;
use rand::prelude::*;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const EPSILON: f64 = 1e-6;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn sanity_check_result(result: &SolveResult, segments: &[Segment], config: &SolverConfig) {
    // Every input segment is placed exactly once.
    let mut placed: Vec<usize> = result
        .patterns
        .iter()
        .flat_map(|p| p.segments.iter().map(|s| s.segment_id))
        .collect();
    placed.sort_unstable();
    let mut expected: Vec<usize> = segments.iter().map(|s| s.segment_id).collect();
    expected.sort_unstable();
    assert_eq!(placed, expected, "segments lost or duplicated");

    let placed_effective: f64 = result
        .patterns
        .iter()
        .flat_map(|p| p.segments.iter().map(|s| s.effective_length))
        .sum();
    let input_effective: f64 = segments.iter().map(|s| s.effective_length).sum();
    assert!((placed_effective - input_effective).abs() < EPSILON);
    assert_eq!(result.summary.total_segments, segments.len());

    for pattern in &result.patterns {
        let used: f64 = pattern.cuts.iter().map(|c| c.cutting_length * c.count as f64).sum();
        assert!(
            used <= pattern.bar_length + config.fit_tolerance + EPSILON,
            "pattern {} overfilled",
            pattern.id
        );
        assert!(pattern.waste >= -EPSILON);
        assert!((pattern.waste - (pattern.bar_length - used).max(0.0)).abs() < EPSILON);

        for segment in &pattern.segments {
            assert!(segment.start <= segment.end);
        }
        for pair in pattern.segments.windows(2) {
            assert!(pair[0].end <= pair[1].start + EPSILON, "segments overlap");
        }

        for (i, a) in pattern.segments.iter().enumerate() {
            for b in &pattern.segments[i + 1..] {
                assert!(
                    !(a.is_from_multi_bar
                        && b.is_from_multi_bar
                        && a.parent_request_id == b.parent_request_id),
                    "pattern {} holds two segments of request {}",
                    pattern.id,
                    a.parent_request_id
                );
            }
        }
    }

    let new_bars = result
        .patterns
        .iter()
        .filter(|p| p.origin == BarOrigin::NewBar)
        .count();
    assert_eq!(result.total_bars_used, new_bars);
    assert_eq!(result.summary.offcuts_used, result.patterns.len() - new_bars);
}

fn random_requests(rng: &mut StdRng, count: usize) -> Vec<CuttingRequest> {
    (0..count)
        .map(|i| {
            let length = rng.gen_range(5..=280) as f64 / 10.0;
            let quantity = rng.gen_range(1..=3);
            CuttingRequest::new(format!("R{i}"), length, quantity).with_lap(0.4)
        })
        .collect()
}

fn segments(lengths: &[f64]) -> Vec<Segment> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &l)| Segment::new(i, format!("R{i}"), l))
        .collect()
}

#[test]
fn scenario_a_pairs_long_and_short() {
    init_tracing();
    let config = SolverConfig::default();
    let requests = [
        CuttingRequest::new("A", 6.1, 5).with_diameter(16),
        CuttingRequest::new("B", 5.9, 5).with_diameter(16),
    ];
    let segments = derive_segments(&requests, &config).unwrap();
    let result = solve_greedy(&segments, 16, &[], &config, &NoProgress).unwrap();

    sanity_check_result(&result, &segments, &config);
    assert_eq!(result.total_bars_used, 5);
    assert_eq!(result.summary.offcuts_used, 0);
    assert!(result.total_waste.abs() < EPSILON);
    for pattern in &result.patterns {
        assert_eq!(pattern.segments.len(), 2);
        assert_ne!(
            pattern.segments[0].parent_request_id,
            pattern.segments[1].parent_request_id
        );
    }
}

#[test]
fn scenario_b_split_request() {
    init_tracing();
    let results = Optimizer::new()
        .add_request(CuttingRequest::new("L", 25.0, 1).with_lap(0.3))
        .optimize(NoProgress)
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.total_bars_used, 3);
    let mut effective: Vec<f64> = result
        .patterns
        .iter()
        .flat_map(|p| p.segments.iter().map(|s| s.effective_length))
        .collect();
    effective.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert!((effective[0] - 11.7).abs() < EPSILON);
    assert!((effective[1] - 11.7).abs() < EPSILON);
    assert!((effective[2] - 1.6).abs() < EPSILON);
}

#[test]
fn scenario_c_empty_input() {
    let config = SolverConfig::default();
    for algorithm in [
        Algorithm::Greedy,
        Algorithm::DynamicProgramming,
        Algorithm::BranchAndBound,
        Algorithm::Swap,
    ] {
        let result = solve_with(algorithm, &[], 16, &[], &config, &NoProgress).unwrap();
        assert_eq!(result.total_bars_used, 0);
        assert!(result.patterns.is_empty());
        assert_eq!(result.status, SolveStatus::Empty);
        assert_eq!(result.algorithm_name, algorithm.name());
    }

    let results = Optimizer::new().optimize(NoProgress).unwrap();
    assert!(results.is_empty());
}

#[test]
fn scenario_d_prefers_offcut() {
    init_tracing();
    let config = SolverConfig::default();
    let segments = segments(&[3.0]);
    let offcuts = [OffcutPiece::new("O1", 3.0)];

    for algorithm in [Algorithm::Greedy, Algorithm::Swap] {
        let result = solve_with(algorithm, &segments, 16, &offcuts, &config, &NoProgress).unwrap();
        sanity_check_result(&result, &segments, &config);
        assert_eq!(result.total_bars_used, 0);
        assert_eq!(result.summary.consumed_offcuts, vec!["O1".to_string()]);
        assert!(result.patterns[0].is_offcut());
    }
}

#[test]
fn exact_solvers_agree_and_beat_greedy() {
    init_tracing();
    let config = SolverConfig::default().with_max_types_per_pattern(8);
    let mut rng: StdRng = SeedableRng::seed_from_u64(7);

    for _ in 0..20 {
        let count = rng.gen_range(4..=12);
        let lengths: Vec<f64> = (0..count)
            .map(|_| 2.0 + rng.gen_range(0..8) as f64 * 0.5)
            .collect();
        let segments = segments(&lengths);

        let greedy = solve_greedy(&segments, 16, &[], &config, &NoProgress).unwrap();
        let dp = solve_dp(&segments, 16, &config, &NoProgress).unwrap();
        let bb = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();

        sanity_check_result(&dp, &segments, &config);
        sanity_check_result(&bb, &segments, &config);
        assert_eq!(dp.status, SolveStatus::Optimal, "{lengths:?}");
        assert_eq!(bb.status, SolveStatus::Optimal, "{lengths:?}");
        assert_eq!(dp.total_bars_used, bb.total_bars_used, "{lengths:?}");
        assert!(dp.total_bars_used <= greedy.total_bars_used);
    }

    // Split requests, whose pieces may not share bars.
    for _ in 0..40 {
        let count = rng.gen_range(2..=4);
        let requests: Vec<CuttingRequest> = (0..count)
            .map(|i| {
                let length = 2.0 + rng.gen_range(0..=34) as f64 * 0.5;
                let quantity = rng.gen_range(1..=2);
                CuttingRequest::new(format!("R{i}"), length, quantity).with_lap(0.4)
            })
            .collect();
        let segments = derive_segments(&requests, &config).unwrap();
        let shape: Vec<(f64, usize)> = requests
            .iter()
            .map(|r| (r.raw_length, r.quantity))
            .collect();

        let greedy = solve_greedy(&segments, 16, &[], &config, &NoProgress).unwrap();
        let dp = solve_dp(&segments, 16, &config, &NoProgress).unwrap();
        let bb = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();

        sanity_check_result(&dp, &segments, &config);
        sanity_check_result(&bb, &segments, &config);
        assert_eq!(dp.method, "exact", "{shape:?}");
        assert_eq!(bb.method, "exact", "{shape:?}");
        assert_eq!(dp.status, SolveStatus::Optimal, "{shape:?}");
        assert_eq!(bb.status, SolveStatus::Optimal, "{shape:?}");
        assert_eq!(dp.total_bars_used, bb.total_bars_used, "{shape:?}");
        assert!(dp.total_bars_used <= greedy.total_bars_used, "{shape:?}");
    }
}

#[test]
fn random_instances_stay_valid() {
    init_tracing();
    let config = SolverConfig::default();
    let mut rng: StdRng = SeedableRng::seed_from_u64(1);

    for _ in 0..5 {
        let count = rng.gen_range(3..=10);
        let requests = random_requests(&mut rng, count);
        let segments = derive_segments(&requests, &config).unwrap();
        let offcuts: Vec<OffcutPiece> = (0..3)
            .map(|i| OffcutPiece::new(format!("O{i}"), rng.gen_range(10..=60) as f64 / 10.0))
            .collect();

        let mut results = Vec::new();
        for algorithm in [
            Algorithm::Greedy,
            Algorithm::DynamicProgramming,
            Algorithm::BranchAndBound,
            Algorithm::Swap,
        ] {
            let result =
                solve_with(algorithm, &segments, 16, &offcuts, &config, &NoProgress).unwrap();
            sanity_check_result(&result, &segments, &config);
            results.push(result);
        }

        // Swap starts from the same packing as greedy and never opens bars.
        assert!(results[3].total_bars_used <= results[0].total_bars_used);

        rank_results(&mut results);
        for pair in results.windows(2) {
            assert!(pair[0].total_bars_used <= pair[1].total_bars_used);
        }
    }
}

#[test]
fn derivation_and_swap_are_deterministic() {
    let config = SolverConfig::default();
    let mut rng: StdRng = SeedableRng::seed_from_u64(3);
    let requests = random_requests(&mut rng, 8);
    let offcuts = [OffcutPiece::new("A", 4.5), OffcutPiece::new("B", 2.0)];

    let first = derive_segments(&requests, &config).unwrap();
    let second = derive_segments(&requests, &config).unwrap();
    assert_eq!(first, second);

    let a = solve_swap(&first, 16, &offcuts, &config, &NoProgress).unwrap();
    let b = solve_swap(&second, 16, &offcuts, &config, &NoProgress).unwrap();
    assert_eq!(a.patterns, b.patterns);
    assert_eq!(a.total_bars_used, b.total_bars_used);
    assert!((a.total_waste - b.total_waste).abs() < EPSILON);
    assert_eq!(a.summary.consumed_offcuts, b.summary.consumed_offcuts);
}

#[test]
fn diameters_share_offcuts_in_order() {
    init_tracing();
    let results = Optimizer::new()
        .add_request(CuttingRequest::new("big", 3.0, 1).with_diameter(20))
        .add_request(CuttingRequest::new("small", 3.0, 1).with_diameter(16))
        .add_offcut(OffcutPiece::new("O1", 3.0))
        .optimize_with(Algorithm::Greedy, NoProgress)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].diameter, 16);
    assert_eq!(results[1].diameter, 20);
    assert_eq!(results[0].summary.consumed_offcuts, vec!["O1".to_string()]);
    assert_eq!(results[0].total_bars_used, 0);
    assert!(results[1].summary.consumed_offcuts.is_empty());
    assert_eq!(results[1].total_bars_used, 1);
}

#[test]
fn offcut_diameter_is_respected() {
    let results = Optimizer::new()
        .add_request(CuttingRequest::new("A", 2.0, 1).with_diameter(16))
        .add_offcut(OffcutPiece::new("O1", 3.0).with_diameter(20))
        .optimize_with(Algorithm::Swap, NoProgress)
        .unwrap();

    assert_eq!(results[0].total_bars_used, 1);
    assert_eq!(results[0].summary.offcuts_used, 0);
}

#[test]
fn invalid_input_fails_before_search() {
    let result = Optimizer::new()
        .add_request(CuttingRequest::new("ok", 4.0, 1))
        .add_request(CuttingRequest::new("bad", 30.0, 1).with_lap(12.0))
        .optimize(NoProgress);
    assert!(
        matches!(result, Err(Error::LapTooLong { .. })),
        "should have returned Error::LapTooLong"
    );

    let result = Optimizer::new()
        .add_request(CuttingRequest::new("ok", 4.0, 1))
        .add_offcut(OffcutPiece::new("broken", -1.0))
        .optimize(NoProgress);
    assert!(matches!(result, Err(Error::InvalidOffcut { .. })));

    let result = Optimizer::new()
        .add_request(CuttingRequest::new("ok", 4.0, 1))
        .set_standard_length(0.0)
        .optimize(NoProgress);
    assert!(matches!(result, Err(Error::InvalidStandardLength(_))));
}

#[test]
fn concurrent_run_ranks_both_results() {
    init_tracing();
    let reports = Mutex::new(Vec::new());
    let ranked = Optimizer::new()
        .add_request(CuttingRequest::new("A", 5.0, 2))
        .add_request(CuttingRequest::new("B", 4.0, 2))
        .add_request(CuttingRequest::new("C", 3.0, 2))
        .optimize_concurrently(|p: &Progress| reports.lock().unwrap().push(p.clone()))
        .unwrap();

    assert_eq!(ranked.len(), 1);
    let results = &ranked[0];
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].algorithm_name, BRANCH_AND_BOUND);
    assert_eq!(results[0].total_bars_used, 2);
    assert_eq!(results[1].algorithm_name, GREEDY);
    assert_eq!(results[1].total_bars_used, 3);

    let reports = reports.lock().unwrap();
    assert!(reports.iter().any(|p| p.algorithm == GREEDY && p.stage == "done"));
    assert!(reports
        .iter()
        .any(|p| p.algorithm == BRANCH_AND_BOUND && p.stage == "done"));
    assert!(reports.iter().all(|p| (0.0..=1.0).contains(&p.fraction)));
}

#[test]
fn progress_is_scaled_across_diameters() {
    let fractions = Mutex::new(Vec::new());
    Optimizer::new()
        .add_request(CuttingRequest::new("A", 5.0, 2).with_diameter(10))
        .add_request(CuttingRequest::new("B", 5.0, 2).with_diameter(12))
        .optimize_with(Algorithm::Greedy, |p: &Progress| {
            if p.stage == "done" {
                fractions.lock().unwrap().push(p.fraction);
            }
        })
        .unwrap();

    let fractions = fractions.lock().unwrap();
    assert_eq!(fractions.len(), 2);
    assert!((fractions[0] - 0.5).abs() < EPSILON);
    assert!((fractions[1] - 1.0).abs() < EPSILON);
}

#[test]
fn cancelled_search_keeps_a_solution() {
    let token = CancelToken::new();
    token.cancel();
    let results = Optimizer::new()
        .add_request(CuttingRequest::new("A", 5.0, 2))
        .add_request(CuttingRequest::new("B", 4.0, 2))
        .add_request(CuttingRequest::new("C", 3.0, 2))
        .set_cancel_token(token)
        .optimize_with(Algorithm::BranchAndBound, NoProgress)
        .unwrap();

    assert_eq!(results[0].status, SolveStatus::BudgetExhausted);
    assert_eq!(results[0].summary.total_segments, 6);
}

#[test]
fn remnants_use_configured_threshold() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_request(CuttingRequest::new("A", 9.0, 1))
        .add_request(CuttingRequest::new("B", 11.5, 1))
        .set_config(SolverConfig::default().with_min_reusable_length(1.0));
    let results = optimizer.optimize_with(Algorithm::Greedy, NoProgress).unwrap();

    let remnants = optimizer.remnants(&results[0]);
    assert_eq!(remnants.len(), 1);
    assert!((remnants[0].length - 3.0).abs() < EPSILON);
    assert_eq!(remnants[0].origin, BarOrigin::NewBar);
}

#[test]
fn large_instances_report_fallback_methods() {
    let config = SolverConfig::default();
    let mut rng: StdRng = SeedableRng::seed_from_u64(11);
    let lengths: Vec<f64> = (0..80)
        .map(|_| rng.gen_range(10..=60) as f64 / 10.0)
        .collect();
    let segments = segments(&lengths);

    let dp = solve_dp(&segments, 16, &config, &NoProgress).unwrap();
    assert_eq!(dp.algorithm_name, DYNAMIC_PROGRAMMING);
    assert_eq!(dp.method, "column_generation");
    sanity_check_result(&dp, &segments, &config);

    let bb = solve_branch_and_bound(&segments, 16, &config, &NoProgress).unwrap();
    assert_eq!(bb.method, "heuristic_fallback");
    sanity_check_result(&bb, &segments, &config);

    let lower_bound = (lengths.iter().sum::<f64>() / 12.01).ceil() as usize;
    assert!(dp.total_bars_used >= lower_bound);
}
