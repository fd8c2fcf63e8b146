//! Paraboloid optimization comparing ranking modes and evaluation pools.

use std::time::Instant;

use paddy_field::{
    Objective, ParallelEvaluator, Runner,
    schema::{ParameterSpace, ParameterSpec, RankingMode, RunnerConfig},
};

fn space() -> ParameterSpace {
    let spec = ParameterSpec::builder(-5.0, 5.0, 0.5)
        .limits(-10.0, 10.0)
        .scaled()
        .normalized()
        .build()
        .expect("valid parameter");
    ParameterSpace::from_pairs([("x", spec.clone()), ("y", spec)]).expect("valid space")
}

fn main() {
    println!("=== Paraboloid: 1 - x^2/7 - y^2/2 ===\n");

    for mode in [RankingMode::Population, RankingMode::Generational] {
        println!("Ranking mode: {:?}", mode);

        let config = RunnerConfig {
            rand_seed_number: 25,
            threshold: 10,
            max_offspring: 12,
            radius: 0.05,
            ranking_mode: mode,
            iterations: 20,
            random_seed: Some(42),
        };

        let start = Instant::now();
        let mut runner = Runner::new(config, space(), Objective::Paraboloid).expect("valid config");
        let status = runner.run().expect("run without checkpoint");
        let elapsed = start.elapsed();

        let report = runner.report();
        println!("  Status:         {:?}", status);
        println!("  Iterations:     {}", report.iterations);
        println!("  Evaluations:    {}", runner.ledger().len());
        println!("  Elapsed:        {:.3}s", elapsed.as_secs_f64());
        if let Some(best) = &report.best {
            println!("  Best fitness:   {:.6}", best.fitness);
            println!("  Best point:     {:?}", best.parameters());
        }
        println!("  Top seeds:      {:?}", runner.top_seeds());
        println!();
    }

    println!("=== Evaluation pool (population ranking) ===\n");

    for workers in [1, 2, 4] {
        let config = RunnerConfig {
            iterations: 15,
            random_seed: Some(7),
            ..Default::default()
        };
        let evaluator = ParallelEvaluator::new(Objective::Paraboloid, workers).expect("thread pool");

        let start = Instant::now();
        let mut runner = Runner::new(config, space(), evaluator).expect("valid config");
        runner.run().expect("run without checkpoint");
        let elapsed = start.elapsed();

        let best = runner.ledger().best().map_or(f64::NAN, |s| s.fitness);
        println!(
            "  {} workers: {} evaluations in {:.3}s, best {:.6}",
            workers,
            runner.ledger().len(),
            elapsed.as_secs_f64(),
            best
        );
    }
}
