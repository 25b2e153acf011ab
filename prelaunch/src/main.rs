//! # prelaunch - Main Entry Point
//!
//! Parks the target before exec, starts the recorder against it, and resumes
//! the target once the recorder acknowledges `enable`. Ctrl+C or
//! `--duration` stops the recording.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::time::Duration;

use prelaunch::cli::Args;
use prelaunch::domain::PreflightError;
use prelaunch::preflight::run_preflight_checks;
use prelaunch::session::{RecordSession, SessionEvent};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOT_FOUND: i32 = 127;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    // Same code a shell uses for a command it cannot find
    match err.downcast_ref::<PreflightError>() {
        Some(PreflightError::TargetNotFound(_)) => EXIT_NOT_FOUND,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<i32> {
    let args = Args::parse();
    let quiet = args.quiet;

    let (target_path, recorder_path) = run_preflight_checks(
        &args.program(),
        &args.recorder,
        args.working_dir.as_deref(),
        quiet,
    )?;

    if !quiet {
        eprintln!("prelaunch v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("target: {}", target_path.display());
        eprintln!("recorder: {}", recorder_path.display());
    }

    let config = args.record_config();
    let mut session = RecordSession::start(&config).context("Failed to start recording session")?;

    if args.json {
        println!("{}", serde_json::to_string(&session.info())?);
    } else if !quiet {
        if let Some(pid) = session.target_pid() {
            eprintln!("pid: {}", pid.0);
        }
        if let Some(paths) = session.fifo_paths() {
            eprintln!("control: {}", paths.control.display());
            eprintln!("ack: {}", paths.ack.display());
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let duration_limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let deadline = async {
        match duration_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut exit_code = EXIT_SUCCESS;
    let exit_reason;

    loop {
        tokio::select! {
            event = session.next_event() => match event {
                SessionEvent::TargetRunning(pid) => {
                    info!("Recording started, target {pid} running");
                    if !quiet {
                        eprintln!("recording: target running");
                    }
                }
                SessionEvent::TargetLaunchFailed(e) => {
                    eprintln!("error: target could not be launched: {e}");
                    exit_code = EXIT_NOT_FOUND;
                    session.stop();
                    exit_reason = "target failed to launch";
                    break;
                }
                SessionEvent::ChannelBroken => {
                    eprintln!("error: failed to start process, broken control FIFO");
                    exit_code = EXIT_ERROR;
                    exit_reason = "control channel broken";
                    break;
                }
                SessionEvent::RecorderExited(status) => {
                    if !status.is_some_and(|s| s.success()) {
                        exit_code = EXIT_ERROR;
                    }
                    exit_reason = "recorder exited";
                    break;
                }
            },
            _ = &mut ctrl_c => {
                session.stop();
                exit_reason = "interrupted";
                break;
            }
            () = &mut deadline => {
                session.stop();
                exit_reason = "duration limit reached";
                break;
            }
        }
    }

    // Recorders exit non-zero when interrupted, so only an unprompted exit
    // counts against the exit code
    if let Some(status) = session.finish_recorder(Duration::from_secs(args.grace)).await {
        info!("Recorder finished: {status}");
    }
    session.teardown();

    if !quiet {
        eprintln!("\n{exit_reason}");
        if exit_code == EXIT_SUCCESS {
            eprintln!("saved: {}", config.output.display());
        }
    }

    Ok(exit_code)
}
