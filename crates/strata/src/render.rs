//! Terminal output for plans, apply reports and state

use colored::{ColoredString, Colorize};
use serde_json::Value;
use strata_cloud::{ApplyOutcome, ApplyReport, RefreshReport};
use strata_core::{Plan, PlanAction, PlanEntry, PlannedValue, ResourceState};

fn symbol(entry: &PlanEntry) -> ColoredString {
    match entry.action {
        PlanAction::Create if entry.replacement => "+/-".green(),
        PlanAction::Create => "+".green(),
        PlanAction::Update => "~".yellow(),
        PlanAction::Destroy if entry.replacement => "-/+".red(),
        PlanAction::Destroy => "-".red(),
        PlanAction::NoOp => " ".normal(),
    }
}

fn value(v: &Value) -> String {
    match v {
        Value::Null => "null".dimmed().to_string(),
        other => other.to_string(),
    }
}

fn planned(v: &PlannedValue) -> String {
    match v {
        PlannedValue::Known(v) => value(v),
        PlannedValue::Unknown => v.to_string().dimmed().to_string(),
    }
}

pub fn refresh(report: &RefreshReport) {
    for address in &report.removed {
        println!(
            "{} {} no longer exists and will be recreated",
            "!".yellow(),
            address.to_string().cyan()
        );
    }
    for address in &report.drifted {
        println!("{} {} changed outside of strata", "!".yellow(), address.to_string().cyan());
    }
    if report.has_changes() {
        println!();
    }
}

pub fn plan(plan: &Plan) {
    if !plan.has_changes() {
        println!("{}", "No changes. Infrastructure matches the configuration.".green());
        return;
    }

    println!("{}", "Strata will perform the following actions:".bold());
    for entry in plan.entries.iter().filter(|e| !e.is_noop()) {
        println!();
        let mut header = format!("  {} {}", symbol(entry), entry.address.to_string().bold());
        if entry.replacement {
            header.push_str(&format!(" {}", "(replace)".yellow()));
        }
        if entry.deposed {
            header.push_str(&format!(" {}", "(deposed)".yellow()));
        }
        println!("{}", header);

        match entry.action {
            PlanAction::Create => {
                for (name, v) in &entry.after {
                    println!("      {}: {}", name, planned(v));
                }
            }
            PlanAction::Update => {
                for change in &entry.changes {
                    let before = change.before.as_ref().map(value).unwrap_or_default();
                    println!("      {}: {} -> {}", name_of(change), before, planned(&change.after));
                }
            }
            PlanAction::Destroy => {
                if let Some(id) = &entry.instance_id {
                    println!("      id: {}", id.dimmed());
                }
                for change in entry.changes.iter().filter(|c| c.forces_replacement) {
                    let before = change.before.as_ref().map(value).unwrap_or_default();
                    println!(
                        "      {}: {} -> {} {}",
                        change.name,
                        before,
                        planned(&change.after),
                        "# forces replacement".red()
                    );
                }
            }
            PlanAction::NoOp => {}
        }
    }

    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

fn name_of(change: &strata_core::AttributeChange) -> String {
    if change.forces_replacement {
        format!("{} {}", change.name, "# forces replacement".red())
    } else {
        change.name.clone()
    }
}

pub fn report(report: &ApplyReport) {
    println!();
    println!("{}", "Apply results:".bold());
    for result in report.results.iter().filter(|r| r.action != PlanAction::NoOp) {
        let label = format!("{}({})", result.action, result.address);
        match &result.outcome {
            ApplyOutcome::Succeeded(_) => println!("  {} {}", "✓".green(), label),
            ApplyOutcome::Failed(error) => {
                println!("  {} {} {}", "✗".red(), label, error.red())
            }
            ApplyOutcome::Skipped { failed_dependency } => println!(
                "  {} {} {}",
                "-".yellow(),
                label,
                format!("skipped: {} failed", failed_dependency).yellow()
            ),
            ApplyOutcome::NotStarted => {
                println!("  {} {} {}", "·".dimmed(), label, "not started".dimmed())
            }
        }
    }

    println!();
    let counts = report.counts();
    let line = format!("{} ({} ms)", counts, report.duration_ms);
    if report.is_success() {
        println!("{} {}", "Apply complete:".green().bold(), line);
    } else if report.cancelled {
        println!("{} {}", "Apply cancelled:".yellow().bold(), line);
    } else {
        println!("{} {}", "Apply failed:".red().bold(), line);
    }
}

pub fn resource(state: &ResourceState) {
    println!("{}", state.address.to_string().bold());
    println!("  id: {}", state.id.cyan());
    for (name, v) in &state.attributes {
        println!("  {}: {}", name, value(v));
    }
    if !state.dependencies.is_empty() {
        let deps: Vec<String> = state.dependencies.iter().map(ToString::to_string).collect();
        println!("  depends on: {}", deps.join(", "));
    }
    for deposed in &state.deposed {
        println!("  {} {}", "deposed:".yellow(), deposed.id);
    }
    println!(
        "  created: {}  updated: {}",
        state.created_at.to_rfc3339().dimmed(),
        state.updated_at.to_rfc3339().dimmed()
    );
}
