use crate::project::Project;
use crate::render;
use std::process::ExitCode;
use strata_cloud::PlanMode;

/// Exit code for a successful plan that has changes
pub const CHANGES_PRESENT: u8 = 2;

pub async fn handle(
    project: &Project,
    destroy: bool,
    refresh: bool,
    detailed_exitcode: bool,
) -> anyhow::Result<ExitCode> {
    let engine = project.engine(None).await?;
    let mode = if destroy { PlanMode::Destroy } else { PlanMode::Normal };

    let run = engine
        .plan(&project.config, mode, refresh && project.settings.refresh)
        .await?;
    if let Some(report) = &run.refresh {
        render::refresh(report);
    }
    render::plan(&run.plan);

    if detailed_exitcode && run.plan.has_changes() {
        return Ok(ExitCode::from(CHANGES_PRESENT));
    }
    Ok(ExitCode::SUCCESS)
}
