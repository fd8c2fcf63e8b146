//! Paddy CLI - Run paddy field optimizations from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use paddy_field::{
    checkpoint::{CheckpointStore, CompressionType},
    compute::{Evaluator, ParallelEvaluator, Runner, RunnerError},
    schema::{OptimizationConfig, RunProgress, RunReport},
};

enum Command {
    Run,
    Resume(PathBuf),
    Extend(PathBuf, usize),
}

#[derive(Debug, PartialEq)]
enum Action {
    Run,
    Resume,
    Extend(usize),
}

#[derive(Debug, PartialEq)]
enum Invocation {
    Example,
    Optimize {
        action: Action,
        config: PathBuf,
        report: Option<PathBuf>,
    },
}

#[derive(Debug, PartialEq, thiserror::Error)]
enum ArgsError {
    #[error("missing configuration file")]
    Usage,
    #[error("--report requires an output path")]
    MissingReportPath,
    #[error("extend requires a positive iteration count")]
    BadExtension,
}

fn parse_args(mut args: Vec<String>) -> Result<Invocation, ArgsError> {
    if args.get(1).map(String::as_str) == Some("--example") {
        return Ok(Invocation::Example);
    }

    let report = match args.iter().position(|a| a == "--report") {
        Some(i) if i + 1 < args.len() => {
            let path = PathBuf::from(args.remove(i + 1));
            args.remove(i);
            Some(path)
        }
        Some(_) => return Err(ArgsError::MissingReportPath),
        None => None,
    };

    let (action, config) = match args.get(1).map(String::as_str) {
        None => return Err(ArgsError::Usage),
        Some("resume") => (Action::Resume, args.get(2)),
        Some("extend") if args.len() < 3 => return Err(ArgsError::Usage),
        Some("extend") => {
            let n = args
                .get(3)
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .ok_or(ArgsError::BadExtension)?;
            (Action::Extend(n), args.get(2))
        }
        Some(_) => (Action::Run, args.get(1)),
    };

    let config = config.map(PathBuf::from).ok_or(ArgsError::Usage)?;
    Ok(Invocation::Optimize {
        action,
        config,
        report,
    })
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "paddy".to_string());

    let (action, config_path, report_path) = match parse_args(args) {
        Ok(Invocation::Example) => {
            print_example_config();
            return;
        }
        Ok(Invocation::Optimize {
            action,
            config,
            report,
        }) => (action, config, report),
        Err(ArgsError::Usage) => {
            print_usage(&program);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: OptimizationConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    let command = match (action, &config.checkpoint) {
        (Action::Run, _) => Command::Run,
        (Action::Resume | Action::Extend(_), None) => {
            eprintln!("Error: resuming requires a checkpoint path in the config");
            std::process::exit(1);
        }
        (Action::Resume, Some(path)) => Command::Resume(path.clone()),
        (Action::Extend(n), Some(path)) => Command::Extend(path.clone(), n),
    };

    if config.compress_checkpoints && !cfg!(feature = "lz4") {
        log::warn!("compress_checkpoints is set but the lz4 feature is disabled; writing plain payloads");
    }

    println!("Paddy Field Optimization");
    println!("========================");
    println!("Objective: {:?}", config.objective);
    println!(
        "Parameters: {}",
        config
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "Seeds: {} random, threshold {}, max offspring {}, radius {}",
        config.runner.rand_seed_number,
        config.runner.threshold,
        config.runner.max_offspring,
        config.runner.radius
    );
    println!(
        "Ranking: {:?}, iterations: {}",
        config.runner.ranking_mode, config.runner.iterations
    );
    println!();

    let result = if config.workers > 1 {
        let evaluator =
            ParallelEvaluator::new(config.objective, config.workers).unwrap_or_else(|e| {
                eprintln!("Error creating evaluation pool: {}", e);
                std::process::exit(1);
            });
        println!("Evaluating on {} workers", evaluator.workers());
        execute(&command, &config, evaluator)
    } else {
        execute(&command, &config, config.objective)
    };

    let report = result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    print_summary(&report);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            eprintln!("Error serializing report: {}", e);
            std::process::exit(1);
        });
        if let Err(e) = fs::write(&path, json) {
            eprintln!("Error writing report: {}", e);
            std::process::exit(1);
        }
        println!("Report written to {}", path.display());
    }
}

fn execute<E: Evaluator>(
    command: &Command,
    config: &OptimizationConfig,
    evaluator: E,
) -> Result<RunReport, RunnerError> {
    let start = Instant::now();
    let progress = |p: &RunProgress| {
        println!(
            "  Iteration {}/{}: best={:.6}, seeds={} (+{}), {:.1}s",
            p.iteration,
            p.iteration_limit,
            p.best_fitness.unwrap_or(f64::NAN),
            p.evaluations,
            p.generation_size,
            start.elapsed().as_secs_f32()
        );
    };

    let compression = if config.compress_checkpoints {
        CompressionType::Lz4
    } else {
        CompressionType::None
    };
    let store = |path: &PathBuf| CheckpointStore::new(path).with_compression(compression);

    let mut runner = match command {
        Command::Run => {
            let runner = Runner::new(config.runner.clone(), config.parameter_space()?, evaluator)?;
            match &config.checkpoint {
                Some(path) => runner.with_checkpoint(store(path)),
                None => runner,
            }
        }
        Command::Resume(path) | Command::Extend(path, _) => {
            Runner::recover(path, evaluator)?.with_checkpoint(store(path))
        }
    };

    println!("Running optimization...");
    match command {
        Command::Run => runner.run_with_callback(progress)?,
        Command::Resume(_) => runner.resume_with_callback(progress)?,
        Command::Extend(_, n) => runner.extend_with_callback(*n, progress)?,
    };

    Ok(runner.report())
}

fn print_summary(report: &RunReport) {
    let evaluations = report.generations.last().map_or(0, |g| g.end_index);

    println!();
    println!("Final state:");
    println!("  Status: {:?}", report.status);
    println!("  Iterations: {}", report.iterations);
    println!("  Evaluations: {}", evaluations);
    if let Some(best) = &report.best {
        println!("  Best fitness: {:.6} (seed {})", best.fitness, best.index);
        for (name, value) in report.parameter_names.iter().zip(&best.values) {
            println!("    {} = {:.6}", name, value.value);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <config.json> [--report <out.json>]", program);
    eprintln!("       {} resume <config.json> [--report <out.json>]", program);
    eprintln!("       {} extend <config.json> <iterations> [--report <out.json>]", program);
    eprintln!();
    eprintln!("Run a paddy field optimization from JSON configuration.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  resume   Recover from the configured checkpoint and continue");
    eprintln!("  extend   Recover, raise the iteration limit and continue");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
}

fn print_example_config() {
    let config = OptimizationConfig {
        checkpoint: Some(PathBuf::from("paddy.ckpt")),
        ..Default::default()
    };

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_report_without_config_is_usage_error() {
        assert_eq!(
            parse_args(args(&["paddy", "--report", "out.json"])),
            Err(ArgsError::Usage)
        );
        assert_eq!(parse_args(args(&["paddy"])), Err(ArgsError::Usage));
        assert_eq!(
            parse_args(args(&["paddy", "resume", "--report", "out.json"])),
            Err(ArgsError::Usage)
        );
    }

    #[test]
    fn test_report_path_is_stripped() {
        let parsed = parse_args(args(&["paddy", "--report", "out.json", "cfg.json"])).unwrap();
        assert_eq!(
            parsed,
            Invocation::Optimize {
                action: Action::Run,
                config: PathBuf::from("cfg.json"),
                report: Some(PathBuf::from("out.json")),
            }
        );
        assert_eq!(
            parse_args(args(&["paddy", "cfg.json", "--report"])),
            Err(ArgsError::MissingReportPath)
        );
    }

    #[test]
    fn test_extend_requires_positive_count() {
        let parsed = parse_args(args(&["paddy", "extend", "cfg.json", "5"])).unwrap();
        assert!(matches!(
            parsed,
            Invocation::Optimize {
                action: Action::Extend(5),
                ..
            }
        ));
        for bad in ["0", "-3", "many"] {
            assert_eq!(
                parse_args(args(&["paddy", "extend", "cfg.json", bad])),
                Err(ArgsError::BadExtension)
            );
        }
        assert_eq!(
            parse_args(args(&["paddy", "extend", "cfg.json"])),
            Err(ArgsError::BadExtension)
        );
        assert_eq!(parse_args(args(&["paddy", "extend"])), Err(ArgsError::Usage));
    }

    #[test]
    fn test_example_flag() {
        assert_eq!(parse_args(args(&["paddy", "--example"])), Ok(Invocation::Example));
    }
}
