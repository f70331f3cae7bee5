use super::apply::{self, ApplyArgs};
use crate::project::Project;
use std::process::ExitCode;
use strata_cloud::PlanMode;

pub async fn handle(
    project: &Project,
    yes: bool,
    parallelism: Option<usize>,
) -> anyhow::Result<ExitCode> {
    apply::handle(
        project,
        ApplyArgs {
            mode: PlanMode::Destroy,
            yes,
            parallelism,
            refresh: true,
        },
    )
    .await
}
