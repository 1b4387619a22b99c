use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use wse_kernel::{init_tracing, Engine, EngineConfig};
use wse_reconcile::{view, ViewRequest};

fn cli() -> Command {
    Command::new("wse-engine")
        .version(wse_kernel::VERSION)
        .about("Workspace engine: mirror reconciliation, doctor audits and a task queue")
        .long_about(
            "Workspace engine: mirror reconciliation, doctor audits and a task queue.\n\
             Settings come from the environment (DATA_DIR, ENGINE_DEBOUNCE_MS, \
             ENGINE_HEARTBEAT_SECS, ENGINE_WORKERS, ENGINE_LOG, ...).",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("daemon").about("Run the scheduler and task queue until Ctrl-C"))
        .subcommand(Command::new("apply").about("Run one apply pass and print its manifest"))
        .subcommand(
            Command::new("doctor").about("Run one doctor pass and print its report (exit 1 on drift)"),
        )
        .subcommand(
            Command::new("view")
                .about("Page through a persisted doctor report")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a specific doctor-*.json[.gz]"),
                )
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory containing reports (default: <DATA_DIR>/_out/doctor)"),
                )
                .arg(
                    Arg::new("last")
                        .long("last")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("file")
                        .help("Use the latest report in --dir"),
                )
                .arg(
                    Arg::new("page")
                        .long("page")
                        .default_value("1")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .default_value("50")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Indent the JSON output"),
                )
                .arg(
                    Arg::new("ok-if-empty")
                        .long("ok-if-empty")
                        .action(ArgAction::SetTrue)
                        .help("Exit 0 with an empty payload when no reports are found"),
                ),
        )
        .subcommand(Command::new("tasks").about("List registered task names"))
        .subcommand(
            Command::new("run")
                .about("Run one task on an in-process queue and print its job record")
                .arg(Arg::new("name").required(true).help("Task name"))
                .arg(
                    Arg::new("args")
                        .long("args")
                        .default_value("{}")
                        .help("JSON argument payload"),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .default_value("600")
                        .value_parser(value_parser!(u64))
                        .help("How long to wait for the job"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    let config = EngineConfig::from_env().context("reading configuration")?;
    init_tracing(&config).context("configuring logging")?;
    let engine = Engine::new(config);

    match matches.subcommand() {
        Some(("daemon", _)) => {
            engine
                .run_daemon(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Ctrl-C handler failed: {e}");
                    }
                })
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(("apply", _)) => {
            let pipeline = engine.pipeline().clone();
            let outcome = tokio::task::spawn_blocking(move || pipeline.apply_pass())
                .await?
                .context("apply pass")?;
            print_json(&outcome.manifest, true)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(("doctor", _)) => {
            let pipeline = engine.pipeline().clone();
            let outcome = tokio::task::spawn_blocking(move || pipeline.doctor_pass())
                .await?
                .context("doctor pass")?;
            print_json(&outcome.report, true)?;
            Ok(exit_code(outcome.report.ok))
        }
        Some(("view", args)) => run_view(&engine, args),
        Some(("tasks", _)) => {
            for name in engine.context().registry.names() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(("run", args)) => run_task(&engine, args).await,
        _ => Ok(ExitCode::from(2)),
    }
}

fn run_view(engine: &Engine, args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let dir = args.get_one::<PathBuf>("dir").cloned().unwrap_or_else(|| {
        wse_reconcile::WorkspaceLayout::new(&engine.config().data_dir).doctor_dir()
    });
    let request = ViewRequest {
        file: args.get_one::<PathBuf>("file").cloned(),
        page: args.get_one::<usize>("page").copied().unwrap_or(1),
        page_size: args.get_one::<usize>("page-size").copied().unwrap_or(50),
        ok_if_empty: args.get_flag("ok-if-empty"),
        ..ViewRequest::latest(dir)
    };
    let payload = view(&request).context("reading doctor reports")?;
    print_json(&payload, args.get_flag("pretty"))?;
    Ok(exit_code(payload.ok()))
}

async fn run_task(engine: &Engine, args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let name = args
        .get_one::<String>("name")
        .context("missing task name")?
        .clone();
    let raw = args.get_one::<String>("args").map_or("{}", String::as_str);
    let payload: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("--args is not JSON: {raw}"))?;
    let timeout = Duration::from_secs(args.get_one::<u64>("timeout-secs").copied().unwrap_or(600));

    let queue = engine.start_queue()?;
    let id = queue.submit(name, payload);
    let job = queue.wait(&id, timeout).await;
    print_json(&job, true)?;

    let done = job.status_str() == "done";
    if let Err(e) = queue.shutdown(engine.config().shutdown_timeout).await {
        tracing::warn!("{e}");
    }
    Ok(exit_code(done))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn view_rejects_file_with_last() {
        let result = cli().try_get_matches_from(["wse-engine", "view", "--file", "x.json", "--last"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_parses_args_and_timeout() {
        let matches = cli()
            .try_get_matches_from([
                "wse-engine",
                "run",
                "sleep",
                "--args",
                "{\"seconds\": 0}",
                "--timeout-secs",
                "5",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(args.get_one::<String>("name").unwrap(), "sleep");
        assert_eq!(args.get_one::<u64>("timeout-secs").copied(), Some(5));
    }
}
