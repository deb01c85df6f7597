//! `hemobank assign`: Manual trigger for the assignment cycle.

use chrono::NaiveDate;
use hemobank_workflow::{AssignmentScheduler, CycleReport, SchedulerSettings};

use super::{CliResult, Runtime, today};

pub fn scheduler(rt: &Runtime) -> AssignmentScheduler {
    AssignmentScheduler::new(
        rt.store.clone(),
        rt.locks.clone(),
        rt.events.clone(),
        SchedulerSettings::from(&rt.config.scheduler),
    )
}

pub async fn run(date: Option<NaiveDate>, json: bool) -> CliResult {
    let rt = Runtime::load().await?;
    let as_of = date.unwrap_or_else(today);

    let report = scheduler(&rt).run_cycle(as_of).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.failed.is_empty() {
        return Err(format!("{} cities failed to commit", report.failed.len()).into());
    }
    Ok(())
}

pub fn print_report(report: &CycleReport) {
    println!("Assignment cycle for {}", report.as_of);
    println!("{:-<72}", "");

    if report.cities.is_empty() && report.skipped.is_empty() && report.failed.is_empty() {
        println!("  No cities with stock or receivers.");
    }

    for city in &report.cities {
        println!(
            "  {} — {} units allotted, deficit {}, {} donors engaged",
            city.city,
            city.units_allotted(),
            city.deficit(),
            city.donors_engaged()
        );
        for r in &city.receivers {
            let status = r.status.map_or("none".to_string(), |s| format!("{s:?}").to_lowercase());
            println!(
                "      {:<20} {:<4} {}/{} units  [{status}]",
                r.name, r.blood_type.as_str(), r.allotted, r.outstanding
            );
        }
    }
    for skipped in &report.skipped {
        println!("  {} — skipped: {}", skipped.city, skipped.reason);
    }
    for failed in &report.failed {
        println!("  {} — FAILED: {}", failed.city, failed.error);
    }

    println!("{:-<72}", "");
    println!(
        "  Total: {} units allotted, deficit {}",
        report.units_allotted(),
        report.deficit()
    );
}
