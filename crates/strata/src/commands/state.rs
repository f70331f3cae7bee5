use crate::render;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use strata_cloud::StateManager;
use strata_core::ResourceAddress;

pub async fn list(root: &Path) -> anyhow::Result<ExitCode> {
    let document = StateManager::new(root).load().await?;
    if document.is_empty() {
        println!("{}", "No resources recorded.".dimmed());
        return Ok(ExitCode::SUCCESS);
    }
    for (address, state) in &document.resources {
        let deposed = if state.deposed.is_empty() {
            String::new()
        } else {
            format!(" ({} deposed)", state.deposed.len()).yellow().to_string()
        };
        println!("{}  {}{}", address, state.id.dimmed(), deposed);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show(root: &Path, address: &str) -> anyhow::Result<ExitCode> {
    let address: ResourceAddress = address.parse()?;
    let document = StateManager::new(root).load().await?;
    match document.get(&address) {
        Some(state) => {
            render::resource(state);
            Ok(ExitCode::SUCCESS)
        }
        None => anyhow::bail!("{} is not in state", address),
    }
}
