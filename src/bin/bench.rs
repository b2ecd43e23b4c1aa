//! Benchmark for search throughput and quality across seeds.
//!
//! Run with: cargo run --release --bin bench [STEPS]

use rayon::prelude::*;
use std::time::Instant;
use timely_scheduler::constraints::ConstraintEvaluator;
use timely_scheduler::demo_data::{self, DemoData};
use timely_scheduler::domain::Problem;
use timely_scheduler::search::{self, SearchOptions};
use tokio_util::sync::CancellationToken;

const SEEDS: [u64; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
const DEFAULT_STEPS: u64 = 20_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let steps = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_STEPS,
    };
    let problem = Problem::from_config(&demo_data::generate(DemoData::Large))?;

    println!("Benchmark: Construction + Annealing");
    println!("  Sessions: {}", problem.sessions.len());
    println!("  Rooms: {}", problem.rooms.len());
    println!("  Slots: {}", problem.slot_count());
    println!("  Steps per seed: {}", steps);
    println!();

    let bench_start = Instant::now();
    let results: Vec<_> = SEEDS
        .par_iter()
        .map(|&seed| {
            let options = SearchOptions::from_problem(&problem)
                .with_seed(seed)
                .with_step_limit(steps);
            let started = Instant::now();
            let outcome = search::run(
                &problem,
                &ConstraintEvaluator,
                options,
                &CancellationToken::new(),
                &mut |_| {},
            );
            (seed, started.elapsed(), outcome)
        })
        .collect();
    let elapsed = bench_start.elapsed();

    println!("Results:");
    let mut total_iterations = 0;
    let mut feasible = 0;
    for (seed, took, outcome) in results {
        match outcome {
            Ok(outcome) => {
                total_iterations += outcome.stats.iterations;
                if outcome.feasible {
                    feasible += 1;
                }
                let per_sec = outcome.stats.iterations as f64 / took.as_secs_f64().max(1e-9);
                println!(
                    "  seed {:>2}: {} in {:.2?} ({:.0} moves/sec, {} accepted)",
                    seed, outcome.score, took, per_sec, outcome.stats.accepted_moves
                );
            }
            Err(failure) => println!("  seed {:>2}: failed: {}", seed, failure),
        }
    }

    println!();
    println!("  Feasible: {}/{}", feasible, SEEDS.len());
    println!("  Time: {:.2?}", elapsed);
    println!(
        "  Moves/sec (all threads): {:.0}",
        total_iterations as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
