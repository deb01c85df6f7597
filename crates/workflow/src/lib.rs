//! Workflow engine: the Daily Assignment Scheduler and its triggers.
//!
//! [`AssignmentScheduler::run_cycle`] is the one entry point for both the
//! manual trigger and the recurring [`DailyTrigger`].

pub mod cron;
pub mod scheduler;
pub mod trigger;

pub use cron::CronExpr;
pub use scheduler::{
    AssignmentScheduler, CityReport, CycleReport, FailedCity, ReceiverOutcome, SchedulerSettings,
    SkippedCity,
};
pub use trigger::DailyTrigger;
