use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use strata_cloud::StateManager;

pub async fn handle(root: &Path, id: &str) -> anyhow::Result<ExitCode> {
    let manager = StateManager::new(root);
    let info = manager.force_unlock(id).await?;

    println!("{}", "✓ State unlocked".green().bold());
    println!(
        "  was held by {} for {} since {}",
        info.holder.cyan(),
        info.operation,
        info.acquired_at.to_rfc3339()
    );
    Ok(ExitCode::SUCCESS)
}
