use std::env;

use schluter_ditra::{DitraClient, Period, Thermostat};

#[tokio::main]
async fn main() -> schluter_ditra::Result<()> {
    tracing_subscriber::fmt::init();

    let email = env::var("DITRA_EMAIL").expect("set DITRA_EMAIL");
    let password = env::var("DITRA_PASSWORD").expect("set DITRA_PASSWORD");

    let mut client = DitraClient::new(email, password);
    client.login().await?;

    let mut thermostats = client.list_thermostats().await?;
    println!("{} thermostats", thermostats.len());

    for thermostat in &mut thermostats {
        thermostat.usage = client.fetch_usage(&thermostat.serial_number, 30).await?;
        print_one(thermostat);
    }

    Ok(())
}

fn print_one(thermostat: &Thermostat) {
    println!(
        "{} (serial {}): {} days of usage",
        thermostat.room,
        thermostat.serial_number,
        thermostat.usage.len(),
    );
    for period in Period::ALL {
        println!(
            "  {}: {:.2} kWh",
            period.label(),
            thermostat.energy_kwh(period),
        );
    }
}
