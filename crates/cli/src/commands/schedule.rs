//! `hemobank schedule`: Donation appointments.

use chrono::NaiveDate;
use hemobank_core::error::InventoryError;
use hemobank_core::DonationSchedule;

use super::{CliResult, Runtime};

pub async fn book(donor_id: &str, date: NaiveDate, location: &str) -> CliResult {
    let rt = Runtime::load().await?;

    let donor = rt
        .store
        .donor(donor_id)
        .await?
        .ok_or_else(|| InventoryError::DonorNotFound(donor_id.to_string()))?;

    let schedule = DonationSchedule::new(&donor.id, date, location);
    rt.store.save_schedule(&schedule).await?;

    println!("Booked {} for {date} at {location}", donor.name);
    println!("   Appointment ID: {}", schedule.id);
    Ok(())
}

pub async fn pending() -> CliResult {
    let rt = Runtime::load().await?;

    let schedules = rt.store.pending_schedules().await?;
    if schedules.is_empty() {
        println!("No pending appointments.");
        return Ok(());
    }

    println!("Pending appointments ({}):", schedules.len());
    println!("{:-<72}", "");
    for s in &schedules {
        let donor = rt
            .store
            .donor(&s.donor_id)
            .await?
            .map_or_else(|| format!("<unknown donor {}>", s.donor_id), |d| d.name);
        println!("  {}  {:<20} {:<20} {}", s.scheduled_on, donor, s.location, s.id);
    }
    Ok(())
}

pub async fn approve(id: &str) -> CliResult {
    let rt = Runtime::load().await?;

    let approval = rt.donation_desk().approve(id).await?;
    let donation = &approval.donation;
    println!(
        "Approved: {} donated {} unit of {} in {} on {}",
        approval.donor.name, donation.units, donation.blood_type, donation.city, donation.donated_on
    );
    if let Some(next) = approval.donor.next_eligible_date {
        println!("   Next eligible: {next}");
    }
    Ok(())
}
