//! HemoBank CLI: the operator entry point.
//!
//! Commands:
//! - `onboard`: Write a default config
//! - `status`: Show configuration and store summary
//! - `assign`: Run the daily assignment cycle once
//! - `daemon`: Run the cycle on its cron schedule
//! - `chat`: Talk to the intake assistant as a patient
//! - `inventory`: Show stock per city
//! - `donate`: Record a walk-in donation
//! - `donor`, `receiver`, `schedule`: Registry and appointment management

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hemobank_core::BloodType;

mod commands;

#[derive(Parser)]
#[command(
    name = "hemobank",
    about = "HemoBank — blood-bank allocation and patient intake",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Show configuration and store summary
    Status {
        /// Also check that the classifier provider is reachable
        #[arg(long)]
        check: bool,
    },

    /// Run one assignment cycle
    Assign {
        /// Cycle date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the assignment cycle on its configured schedule
    Daemon,

    /// Chat with the intake assistant
    Chat {
        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        blood_type: Option<BloodType>,

        /// Units needed for an urgent request
        #[arg(long)]
        units: Option<u32>,

        /// Registered receiver ID
        #[arg(long)]
        receiver: Option<String>,

        /// Preferred date for the next transfusion
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show stock per city and blood type
    Inventory {
        /// Only this city
        city: Option<String>,
    },

    /// Record a donation into a city's inventory
    Donate {
        #[arg(long)]
        city: String,

        #[arg(long)]
        blood_type: BloodType,

        #[arg(long, default_value_t = 1)]
        units: u32,

        /// Donor name for walk-in donations
        #[arg(long, default_value = "walk-in")]
        name: String,

        /// Registered donor ID
        #[arg(long)]
        donor: Option<String>,

        /// Donation date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Manage donors
    Donor {
        #[command(subcommand)]
        action: DonorAction,
    },

    /// Manage receivers
    Receiver {
        #[command(subcommand)]
        action: ReceiverAction,
    },

    /// Manage donation appointments
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum DonorAction {
    /// Register a donor
    Register {
        name: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        blood_type: BloodType,
    },
    /// List donors of a city in call-in order
    List { city: String },
}

#[derive(Subcommand)]
enum ReceiverAction {
    /// Register a receiver
    Register {
        name: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        blood_type: BloodType,
        /// Units per transfusion
        #[arg(long)]
        units: Option<u32>,
        /// First transfusion date
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Set a receiver's next transfusion date
    Reschedule { id: String, date: NaiveDate },
    /// Show a receiver and their allotments
    Show { id: String },
    /// Cancel a pending allotment so the units are owed again
    CancelAllotment { id: String, allotment: String },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Book a donation appointment
    Book {
        donor: String,
        date: NaiveDate,
        #[arg(long, default_value = "Blood bank")]
        location: String,
    },
    /// List pending appointments
    Pending,
    /// Approve an appointment and record its donation
    Approve { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status { check } => commands::status::run(check).await?,
        Commands::Assign { date, json } => commands::assign::run(date, json).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Chat {
            city,
            blood_type,
            units,
            receiver,
            date,
            message,
        } => {
            let profile = hemobank_assistant::PatientProfile {
                city,
                blood_type,
                required_units: units,
                receiver_id: receiver,
                requested_date: date,
            };
            commands::chat::run(profile, message).await?
        }
        Commands::Inventory { city } => commands::inventory::show(city).await?,
        Commands::Donate {
            city,
            blood_type,
            units,
            name,
            donor,
            date,
        } => commands::inventory::donate(&city, blood_type, units, &name, donor, date).await?,
        Commands::Donor { action } => match action {
            DonorAction::Register {
                name,
                city,
                blood_type,
            } => commands::registry::register_donor(&name, &city, blood_type).await?,
            DonorAction::List { city } => commands::registry::list_donors(&city).await?,
        },
        Commands::Receiver { action } => match action {
            ReceiverAction::Register {
                name,
                city,
                blood_type,
                units,
                due,
            } => commands::registry::register_receiver(&name, &city, blood_type, units, due).await?,
            ReceiverAction::Reschedule { id, date } => {
                commands::registry::reschedule_receiver(&id, date).await?
            }
            ReceiverAction::Show { id } => commands::registry::show_receiver(&id).await?,
            ReceiverAction::CancelAllotment { id, allotment } => {
                commands::registry::cancel_allotment(&id, &allotment).await?
            }
        },
        Commands::Schedule { action } => match action {
            ScheduleAction::Book {
                donor,
                date,
                location,
            } => commands::schedule::book(&donor, date, &location).await?,
            ScheduleAction::Pending => commands::schedule::pending().await?,
            ScheduleAction::Approve { id } => commands::schedule::approve(&id).await?,
        },
    }

    Ok(())
}
