use std::env;
use std::time::Duration;

use schluter_ditra::{AccountSnapshot, EnergyCoordinator, Period};

#[tokio::main]
async fn main() -> schluter_ditra::Result<()> {
    tracing_subscriber::fmt::init();

    let email = env::var("DITRA_EMAIL").expect("set DITRA_EMAIL");
    let password = env::var("DITRA_PASSWORD").expect("set DITRA_PASSWORD");

    let mut coordinator = EnergyCoordinator::builder(email, password)
        .on_snapshot(|snapshot| {
            println!(
                "snapshot {} fetched at {} ({} thermostats)",
                snapshot.generation,
                snapshot.fetched_at,
                snapshot.thermostats.len(),
            );
        })
        .build();

    println!("Fetching initial data...");
    coordinator.first_refresh().await?;

    // Display cadence: re-read the published snapshot every 5 minutes. Only
    // the coordinator's own 15 minute cycle talks to the network.
    let mut rx = coordinator.subscribe();
    tokio::spawn(async move {
        let mut seen = 0u64;
        let mut ticker = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            ticker.tick().await;
            let Some(snapshot) = rx.borrow_and_update().clone() else {
                continue;
            };
            if snapshot.generation == seen {
                continue;
            }
            seen = snapshot.generation;
            print_totals(&snapshot);
        }
    });

    if let Err(e) = coordinator.run().await {
        eprintln!("Polling halted: {e}");
        if e.needs_reauth() {
            eprintln!("Re-enter credentials and restart.");
        }
        return Err(e);
    }
    Ok(())
}

fn print_totals(snapshot: &AccountSnapshot) {
    for thermostat in &snapshot.thermostats {
        for period in Period::ALL {
            println!(
                "[{}] {}: {:.2} kWh",
                thermostat.room,
                period.label(),
                thermostat.energy_kwh(period),
            );
        }
    }
}
