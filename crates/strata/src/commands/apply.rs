use crate::project::Project;
use crate::render;
use colored::Colorize;
use std::io::Write;
use std::process::ExitCode;
use strata_cloud::{CancellationToken, PlanMode};

pub struct ApplyArgs {
    pub mode: PlanMode,
    pub yes: bool,
    pub parallelism: Option<usize>,
    pub refresh: bool,
}

pub async fn handle(project: &Project, args: ApplyArgs) -> anyhow::Result<ExitCode> {
    let engine = project.engine(args.parallelism).await?;
    let operation = match args.mode {
        PlanMode::Normal => "apply",
        PlanMode::Destroy => "destroy",
    };

    // Held from planning until the last commit; released on every return path by Drop.
    let lock = engine.lock(operation).await?;

    let run = engine
        .plan(&project.config, args.mode, args.refresh && project.settings.refresh)
        .await?;
    if let Some(report) = &run.refresh {
        render::refresh(report);
    }
    render::plan(&run.plan);

    if !run.plan.has_changes() {
        lock.release().await?;
        return Ok(ExitCode::SUCCESS);
    }

    if !args.yes && !confirm(operation)? {
        println!("{}", format!("{} cancelled.", capitalize(operation)).yellow());
        lock.release().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupt received, finishing in-flight operations...".yellow()
            );
            on_signal.cancel();
        }
    });

    let report = engine.apply(&run, &lock, cancel).await;
    lock.release().await?;
    let report = report?;

    render::report(&report);
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn confirm(operation: &str) -> anyhow::Result<bool> {
    println!();
    print!("Do you want to {}? Only 'yes' will be accepted: ", operation);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
