mod cli;
mod console;
mod logging;
mod settings;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use mirror_core::PageJob;
use mirror_engine::{regenerate_template, EngineEvent, EngineHandle, Mirror, MirrorError};
use mirror_logging::{mirror_error, mirror_info};

use cli::{Cli, Command, MirrorArgs, TemplateArgs};
use console::Console;
use logging::LogDestination;

/// Conventional exit status after SIGINT.
const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(LogDestination::from_option(cli.log_file.clone()), cli.quiet);

    let outcome = match cli.command {
        Command::Mirror(args) => mirror(args, cli.quiet),
        Command::Template(args) => template(args),
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            mirror_error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn mirror(args: MirrorArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let file = match &args.config {
        Some(path) => settings::load(path)?,
        None => settings::FileSettings::default(),
    };
    let run = settings::resolve(file, &args);
    let job = PageJob::new(&args.url, args.product.as_str(), run.output_root, run.options)?;
    let mirror = Mirror::for_job(job, run.config).context("failed to prepare the HTTP client")?;

    let handle = EngineHandle::start(mirror);
    let control = handle.control().clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancellation requested, stopping transfers...");
        control.cancel_run();
    })
    .context("failed to install the Ctrl+C handler")?;

    let mut console = Console::new(quiet);
    while !handle.is_finished() {
        if let Some(event) = handle.recv_timeout(Duration::from_millis(100)) {
            show(&mut console, &event);
        }
    }

    let log = handle.log().clone();
    let (outcome, remaining) = handle.wait();
    for event in remaining.try_iter() {
        show(&mut console, &event);
    }

    let issues = log.issues_report();
    if !issues.is_empty() {
        eprintln!("\nIssues ({}):\n{issues}", log.issues().len());
    }

    match outcome {
        Ok(report) => {
            println!("\n{}", console::summary(&report));
            mirror_info!("Run finished at {}", Utc::now().to_rfc3339());
            Ok(ExitCode::SUCCESS)
        }
        Err(MirrorError::Cancelled) => {
            eprintln!("Run cancelled; files saved so far were kept.");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(err) => Err(err.into()),
    }
}

fn template(args: TemplateArgs) -> anyhow::Result<ExitCode> {
    let output = regenerate_template(&args.folder, &args.product)?;
    println!(
        "Rebuilt template in {}: {} product mention(s), {} CTA link(s){}",
        args.folder.display(),
        output.product_mentions,
        output.cta_links,
        if output.header_inserted { "" } else { ", no </title> for the header marker" }
    );
    Ok(ExitCode::SUCCESS)
}

fn show(console: &mut Console, event: &EngineEvent) {
    if let Some(line) = console.render(event, Instant::now()) {
        println!("{line}");
    }
}
