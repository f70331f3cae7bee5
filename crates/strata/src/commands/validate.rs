use crate::project::Project;
use colored::Colorize;
use std::process::ExitCode;

pub async fn handle(project: &Project) -> anyhow::Result<ExitCode> {
    println!("{}", "Validating configuration...".blue());
    println!("Config file: {}", project.config_path.display().to_string().cyan());

    let engine = project.engine(None).await?;
    if let Err(e) = engine.validate(&project.config) {
        eprintln!();
        eprintln!("{}", "✗ Configuration error".red().bold());
        eprintln!("  {}", e);
        return Ok(ExitCode::FAILURE);
    }

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Project: {}", project.config.project.cyan());
    println!("Resources: {}", project.config.resources.len());
    for spec in &project.config.resources {
        let deps: Vec<String> = spec.dependencies().iter().map(ToString::to_string).collect();
        if deps.is_empty() {
            println!("  - {}", spec.address.to_string().cyan());
        } else {
            println!("  - {} (after {})", spec.address.to_string().cyan(), deps.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}
