//! `hemobank inventory` and `hemobank donate`: Stock ledger commands.

use chrono::NaiveDate;
use hemobank_core::error::InventoryError;
use hemobank_core::{BloodType, CityInventory, Donation};

use super::{CliResult, Runtime, today};

pub async fn show(city: Option<String>) -> CliResult {
    let rt = Runtime::load().await?;

    let cities = match city {
        Some(city) => vec![city],
        None => rt.store.cities().await?,
    };
    if cities.is_empty() {
        println!("No inventories yet. Record a donation with `hemobank donate`.");
        return Ok(());
    }

    for city in cities {
        match rt.store.inventory(&city).await? {
            Some(inventory) => print_inventory(&inventory),
            None => println!("{city}: no blood bank"),
        }
    }
    Ok(())
}

fn print_inventory(inventory: &CityInventory) {
    println!("{}", inventory.city);
    let totals = inventory.totals();
    if totals.is_empty() {
        println!("   (empty)");
        return;
    }
    for (blood_type, units) in totals {
        let oldest = inventory
            .lots(blood_type)
            .next()
            .map(|lot| lot.collected_on.to_string())
            .unwrap_or_default();
        println!("   {:<4} {units:>4} units  (oldest {oldest})", blood_type.as_str());
    }
}

pub async fn donate(
    city: &str,
    blood_type: BloodType,
    units: u32,
    name: &str,
    donor_id: Option<String>,
    date: Option<NaiveDate>,
) -> CliResult {
    let rt = Runtime::load().await?;

    let donor_name = match &donor_id {
        Some(id) => rt
            .store
            .donor(id)
            .await?
            .map(|d| d.name)
            .ok_or_else(|| InventoryError::DonorNotFound(id.clone()))?,
        None => name.to_string(),
    };

    let mut donation = Donation::new(donor_name, city, blood_type, units, date.unwrap_or_else(today));
    donation.donor_id = donor_id;

    let inventory = rt.donation_desk().record(&donation).await?;
    println!(
        "Recorded {units} units of {blood_type} in {city}; {} units on hand.",
        inventory.total_units(blood_type)
    );
    Ok(())
}
