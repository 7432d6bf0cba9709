use std::fmt;

use chrono::{DateTime, Utc};

/// Opaque session identifier returned by the vendor login endpoint.
/// Required on every subsequent authenticated call.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(pub(crate) String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Session ids are credentials; keep them out of debug output.
        write!(f, "SessionToken(***)")
    }
}

/// Fixed periods the display layer derives energy readings for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Day, Period::Week, Period::Month];

    /// Number of usage windows the period sums over.
    pub fn window_count(&self) -> usize {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::Day => "Energy Used Today",
            Period::Week => "Energy Used Last 7 Days",
            Period::Month => "Energy Used Last 30 Days",
        }
    }
}

/// A single metered reading within one day's window.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub energy_kwh: f64,
    /// Position within the containing window. Assigned from the entry's
    /// position in the vendor's list, never read from the payload.
    pub bucket: usize,
}

/// One calendar day's worth of metered samples for one thermostat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageWindow {
    pub samples: Vec<UsageSample>,
}

impl UsageWindow {
    pub fn total_kwh(&self) -> f64 {
        self.samples.iter().map(|s| s.energy_kwh).sum()
    }
}

/// One physical floor-heating thermostat.
///
/// Rebuilt from scratch on every refresh cycle. `usage` holds at most the
/// configured history depth of windows, in vendor response order (index 0 =
/// most recent day).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thermostat {
    pub serial_number: String,
    pub room: String,
    pub usage: Vec<UsageWindow>,
}

impl Thermostat {
    /// Sum of sample energies over the period's windows, clipped to however
    /// many windows are actually available. This is the contract the display
    /// sink renders (kWh, 2 decimal places).
    pub fn energy_kwh(&self, period: Period) -> f64 {
        self.usage
            .iter()
            .take(period.window_count())
            .map(UsageWindow::total_kwh)
            .sum()
    }
}

/// The complete, internally consistent device+usage state from one
/// successful fetch cycle. Published wholesale; never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub thermostats: Vec<Thermostat>,
    pub fetched_at: DateTime<Utc>,
    /// Increments once per successful cycle; lets a subscriber tell whether
    /// it has already seen this snapshot.
    pub generation: u64,
}

impl AccountSnapshot {
    pub fn thermostat(&self, serial: &str) -> Option<&Thermostat> {
        self.thermostats.iter().find(|t| t.serial_number == serial)
    }
}
