//! `hemobank donor` and `hemobank receiver`: Registry commands.

use chrono::NaiveDate;
use hemobank_core::error::InventoryError;
use hemobank_core::{BloodType, Donor, Receiver};
use tracing::info;

use super::{CliResult, Runtime, today};

pub async fn register_donor(name: &str, city: &str, blood_type: BloodType) -> CliResult {
    let rt = Runtime::load().await?;

    let mut donor = Donor::new(name, city, blood_type);
    donor.donation_interval_days = rt.config.defaults.donation_interval_days;
    rt.store.save_donor(&donor).await?;
    info!(donor_id = %donor.id, city, "Donor registered");

    println!("Registered donor {} ({blood_type}, {city})", donor.name);
    println!("   ID: {}", donor.id);
    Ok(())
}

pub async fn list_donors(city: &str) -> CliResult {
    let rt = Runtime::load().await?;

    let mut donors = rt.store.donors_in(city).await?;
    if donors.is_empty() {
        println!("No donors registered in {city}.");
        return Ok(());
    }
    donors.sort_by(Donor::waiting_order);

    let as_of = today();
    println!("Donors in {city} (call-in order):");
    for donor in &donors {
        let last = donor
            .last_donation_date
            .map_or("never".to_string(), |d| d.to_string());
        let eligible = if donor.is_eligible_on(as_of) { "eligible" } else { "resting" };
        println!(
            "   {:<20} {:<4} last {last:<10}  {eligible:<8}  {}",
            donor.name,
            donor.blood_type.as_str(),
            donor.id
        );
    }
    Ok(())
}

pub async fn register_receiver(
    name: &str,
    city: &str,
    blood_type: BloodType,
    units: Option<u32>,
    due: Option<NaiveDate>,
) -> CliResult {
    let rt = Runtime::load().await?;
    let defaults = &rt.config.defaults;

    let units = units.unwrap_or(defaults.required_units);
    if units == 0 {
        return Err("Required units must be at least 1".into());
    }

    let mut receiver = Receiver::new(name, city, blood_type, units);
    receiver.transfusion_interval_days = defaults.transfusion_interval_days;
    if let Some(due) = due {
        receiver.reschedule(due);
    }
    rt.store.save_receiver(&receiver).await?;
    info!(receiver_id = %receiver.id, city, "Receiver registered");

    println!("Registered receiver {} ({blood_type}, {city}, {units} units)", receiver.name);
    println!("   ID: {}", receiver.id);
    match receiver.next_due_date {
        Some(due) => println!("   Next transfusion: {due}"),
        None => println!("   No transfusion booked; use `hemobank receiver reschedule`."),
    }
    Ok(())
}

pub async fn reschedule_receiver(id: &str, date: NaiveDate) -> CliResult {
    let rt = Runtime::load().await?;

    let mut receiver = rt
        .store
        .receiver(id)
        .await?
        .ok_or_else(|| InventoryError::ReceiverNotFound(id.to_string()))?;
    receiver.reschedule(date);
    rt.store.save_receiver(&receiver).await?;

    println!("Next transfusion for {} set to {date}", receiver.name);
    Ok(())
}

pub async fn show_receiver(id: &str) -> CliResult {
    let rt = Runtime::load().await?;

    let receiver = rt
        .store
        .receiver(id)
        .await?
        .ok_or_else(|| InventoryError::ReceiverNotFound(id.to_string()))?;

    println!("{} ({}, {})", receiver.name, receiver.blood_type, receiver.city);
    println!("   Units per transfusion: {}", receiver.required_units);
    println!("   Interval:              {} days", receiver.transfusion_interval_days);
    if let Some(last) = receiver.last_transfusion_date {
        println!("   Last transfusion:      {last}");
    }
    if let Some(next) = receiver.next_due_date {
        println!("   Next transfusion:      {next}");
    }

    let allotments = rt.store.allotments_for(id).await?;
    if !allotments.is_empty() {
        println!("   Allotments:");
        for a in &allotments {
            println!("      {}  {} units  {:<9}  {}", a.allotted_on, a.units_allotted, format!("{:?}", a.status), a.id);
        }
    }
    Ok(())
}

pub async fn cancel_allotment(receiver_id: &str, allotment_id: &str) -> CliResult {
    let rt = Runtime::load().await?;

    let allotment = super::assign::scheduler(&rt)
        .cancel_allotment(receiver_id, allotment_id)
        .await?;

    println!(
        "Cancelled allotment {} ({} units of {} on {})",
        allotment.id, allotment.units_allotted, allotment.blood_type, allotment.allotted_on
    );
    Ok(())
}
