// src/main.rs

use taskgraph::cli::{self, Command, PluginsAction};
use taskgraph::{hash_only, plugins_list, resume_run, run_clean, run_incremental, validate_only};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = taskgraph::logging::init_logging(args.log_level) {
        eprintln!("taskgraph error: {err:?}");
        std::process::exit(2);
    }
    std::process::exit(run_main(args).await);
}

/// Runs the selected command and returns the process exit code, per the
/// external-interfaces contract's closed {0,1,2,3,4} set.
async fn run_main(args: cli::CliArgs) -> i32 {
    match args.command.clone() {
        Command::Validate => match validate_only(&args.graph) {
            Ok(()) => 0,
            Err(err) => report(err),
        },
        Command::Hash => match hash_only(&args.graph) {
            Ok(hash) => {
                println!("{hash}");
                0
            }
            Err(err) => report(err),
        },
        Command::Run { workers, incremental } => {
            let outcome = if incremental {
                run_incremental(&args.graph, &args.work_dir, &args.cache_dir, &args.recovery_dir, workers).await
            } else {
                run_clean(&args.graph, &args.work_dir, &args.cache_dir, &args.recovery_dir, workers).await
            };
            match outcome {
                Ok(outcome) => {
                    println!("{}", outcome.run_record.run_id);
                    if outcome.result.has_failure() {
                        3
                    } else {
                        0
                    }
                }
                Err(err) => report(err),
            }
        }
        Command::Resume {
            previous_run_id,
            workers,
            failed_only,
        } => {
            let outcome = resume_run(
                &args.graph,
                &args.work_dir,
                &args.cache_dir,
                &args.recovery_dir,
                &previous_run_id,
                workers,
                failed_only,
            )
            .await;
            match outcome {
                Ok(outcome) => {
                    println!("{}", outcome.run_record.run_id);
                    if outcome.result.has_failure() {
                        3
                    } else {
                        0
                    }
                }
                Err(err) => report(err),
            }
        }
        Command::Plugins { action } => match action {
            PluginsAction::List => {
                for name in plugins_list() {
                    println!("{name}");
                }
                0
            }
        },
    }
}

fn report(err: taskgraph::errors::EngineError) -> i32 {
    eprintln!("taskgraph error: {err}");
    err.cli_exit_code()
}
