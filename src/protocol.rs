use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::types::{SessionToken, Thermostat, UsageSample, UsageWindow};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://ditra-heat-e-wifi.schluter.com/api";

/// Client identifier the vendor expects in every login body.
const APPLICATION_ID: u8 = 8;

pub fn login_body(email: &str, password: &str) -> Value {
    json!({
        "Email": email,
        "Password": password,
        "Application": APPLICATION_ID,
        "Confirm": "",
    })
}

/// Query pairs for the usage-history endpoint. `history = N` asks for N
/// additional days before the anchor date, so N+1 days come back in total.
pub fn usage_query(
    session: &SessionToken,
    serial_number: &str,
    date: NaiveDate,
    history: usize,
) -> Vec<(&'static str, String)> {
    vec![
        ("sessionId", session.as_str().to_string()),
        ("serialnumber", serial_number.to_string()),
        ("view", "day".to_string()),
        ("date", format_usage_date(date)),
        ("history", history.to_string()),
        ("calc", "false".to_string()),
        ("weekstart", "monday".to_string()),
    ]
}

/// The vendor's anchor-date format, trailing comma included. The endpoint
/// expects the comma verbatim; do not strip it.
pub fn format_usage_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y,").to_string()
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    // Kept as a raw value: `SessionId` must be a non-empty string, and
    // anything else (absent, null, numeric) is a refused login, not a
    // parse error.
    #[serde(rename = "SessionId")]
    session_id: Option<Value>,
    #[serde(rename = "ErrorCode")]
    error_code: Option<i64>,
}

pub fn parse_login_response(body: &str) -> Result<SessionToken> {
    let parsed: LoginResponse = deserialize(body)?;
    if let Some(code) = parsed.error_code
        && code != 0
    {
        return Err(Error::Auth(format!("login rejected with error code {code}")));
    }
    match parsed.session_id {
        Some(Value::String(id)) if !id.is_empty() => Ok(SessionToken(id)),
        Some(Value::String(_)) | None => {
            Err(Error::Auth("login response carried no session id".to_string()))
        }
        Some(_) => Err(Error::Auth(
            "login response session id was not a string".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ThermostatsResponse {
    #[serde(rename = "Groups", default)]
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    #[serde(rename = "Thermostats")]
    thermostats: Vec<ThermostatEntry>,
}

#[derive(Debug, Deserialize)]
struct ThermostatEntry {
    #[serde(rename = "SerialNumber")]
    serial_number: SerialNumber,
    #[serde(rename = "Room")]
    room: String,
}

/// Serial numbers show up as bare numbers in some vendor responses and as
/// strings in others; normalize to a string key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SerialNumber {
    Text(String),
    Number(u64),
}

impl SerialNumber {
    fn into_string(self) -> String {
        match self {
            SerialNumber::Text(s) => s,
            SerialNumber::Number(n) => n.to_string(),
        }
    }
}

/// Flattens every group's thermostat list into one flat list, preserving
/// vendor order. Usage windows start empty; they are filled in per device
/// by a separate fetch.
pub fn parse_thermostats_response(body: &str) -> Result<Vec<Thermostat>> {
    let parsed: ThermostatsResponse = deserialize(body)?;
    if parsed.groups.is_empty() {
        return Err(Error::UpstreamData { path: "Groups" });
    }
    Ok(parsed
        .groups
        .into_iter()
        .flat_map(|g| g.thermostats)
        .map(|t| Thermostat {
            serial_number: t.serial_number.into_string(),
            room: t.room,
            usage: Vec::new(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(rename = "EnergyUsage")]
    energy_usage: Vec<UsageDay>,
}

#[derive(Debug, Deserialize)]
struct UsageDay {
    // No default: a day without its "Usage" key is shape drift, not an
    // empty day, and must fail the parse rather than read as zero usage.
    #[serde(rename = "Usage")]
    usage: Vec<UsageEntry>,
}

#[derive(Debug, Deserialize)]
struct UsageEntry {
    #[serde(rename = "EnergyKWattHour", deserialize_with = "non_negative_kwh")]
    energy_kwh: f64,
}

fn non_negative_kwh<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 {
        return Err(serde::de::Error::custom("negative energy reading"));
    }
    Ok(value)
}

/// Day windows come back in vendor order (most recent first); that order is
/// preserved verbatim. Sample buckets are numbered from each day's entry
/// position, never read from the payload. Anything past `window_count` days
/// is dropped.
pub fn parse_energy_usage_response(body: &str, window_count: usize) -> Result<Vec<UsageWindow>> {
    let parsed: UsageResponse = deserialize(body)?;
    let mut windows: Vec<UsageWindow> = parsed
        .energy_usage
        .into_iter()
        .map(|day| UsageWindow {
            samples: day
                .usage
                .into_iter()
                .enumerate()
                .map(|(bucket, entry)| UsageSample {
                    energy_kwh: entry.energy_kwh,
                    bucket,
                })
                .collect(),
        })
        .collect();
    windows.truncate(window_count);
    Ok(windows)
}

fn deserialize<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| {
        let path = e.path().to_string();
        Error::Malformed {
            path,
            source: e.into_inner(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_body_structure() {
        let body = login_body("user@example.com", "hunter2");
        assert_eq!(body["Email"], "user@example.com");
        assert_eq!(body["Password"], "hunter2");
        assert_eq!(body["Application"], 8);
        assert_eq!(body["Confirm"], "");
    }

    #[test]
    fn usage_date_keeps_trailing_comma() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_usage_date(date), "07/03/2024,");
    }

    #[test]
    fn usage_query_pairs() {
        let session = SessionToken("abc123".to_string());
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let query = usage_query(&session, "951601", date, 29);
        assert_eq!(query[0], ("sessionId", "abc123".to_string()));
        assert_eq!(query[1], ("serialnumber", "951601".to_string()));
        assert_eq!(query[2], ("view", "day".to_string()));
        assert_eq!(query[3], ("date", "31/12/2024,".to_string()));
        assert_eq!(query[4], ("history", "29".to_string()));
        assert_eq!(query[5], ("calc", "false".to_string()));
        assert_eq!(query[6], ("weekstart", "monday".to_string()));
    }

    #[test]
    fn parse_login_ok() {
        let body = r#"{"SessionId": "deadbeef", "ErrorCode": 0}"#;
        let token = parse_login_response(body).unwrap();
        assert_eq!(token.as_str(), "deadbeef");
    }

    #[test]
    fn parse_login_error_code() {
        let body = r#"{"ErrorCode": 2}"#;
        let err = parse_login_response(body).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("error code 2"));
    }

    #[test]
    fn parse_login_missing_session_id() {
        let err = parse_login_response("{}").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn parse_login_numeric_session_id() {
        let err = parse_login_response(r#"{"SessionId": 123456}"#).unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "expected Auth, got {err:?}");
        assert!(err.needs_reauth());
    }

    #[test]
    fn parse_login_null_session_id() {
        let err = parse_login_response(r#"{"SessionId": null}"#).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn parse_login_garbage() {
        let err = parse_login_response("not json").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn parse_thermostats_flattens_groups_in_order() {
        let body = r#"{
            "Groups": [
                {"Thermostats": [
                    {"SerialNumber": "100", "Room": "Bathroom"},
                    {"SerialNumber": "200", "Room": "Kitchen"}
                ]},
                {"Thermostats": [
                    {"SerialNumber": "300", "Room": "Hallway"}
                ]}
            ]
        }"#;
        let thermostats = parse_thermostats_response(body).unwrap();
        assert_eq!(thermostats.len(), 3);
        assert_eq!(thermostats[0].serial_number, "100");
        assert_eq!(thermostats[0].room, "Bathroom");
        assert_eq!(thermostats[1].serial_number, "200");
        assert_eq!(thermostats[2].serial_number, "300");
        assert!(thermostats[0].usage.is_empty());
    }

    #[test]
    fn parse_thermostats_numeric_serials() {
        let body = r#"{"Groups": [{"Thermostats": [{"SerialNumber": 951601, "Room": "Ensuite"}]}]}"#;
        let thermostats = parse_thermostats_response(body).unwrap();
        assert_eq!(thermostats[0].serial_number, "951601");
    }

    #[test]
    fn parse_thermostats_empty_group_is_ok() {
        let body = r#"{"Groups": [{"Thermostats": []}]}"#;
        let thermostats = parse_thermostats_response(body).unwrap();
        assert!(thermostats.is_empty());
    }

    #[test]
    fn parse_thermostats_no_groups() {
        let err = parse_thermostats_response(r#"{"Groups": []}"#).unwrap_err();
        assert!(matches!(err, Error::UpstreamData { path: "Groups" }));

        let err = parse_thermostats_response("{}").unwrap_err();
        assert!(matches!(err, Error::UpstreamData { path: "Groups" }));
    }

    #[test]
    fn parse_thermostats_wrong_room_type() {
        let body = r#"{"Groups": [{"Thermostats": [{"SerialNumber": "100", "Room": 42}]}]}"#;
        let err = parse_thermostats_response(body).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        assert!(err.to_string().contains("Room"));
    }

    #[test]
    fn parse_usage_buckets_from_position() {
        let body = r#"{
            "EnergyUsage": [
                {"Usage": [
                    {"EnergyKWattHour": 0.25},
                    {"EnergyKWattHour": 0.5},
                    {"EnergyKWattHour": 0.0}
                ]},
                {"Usage": [
                    {"EnergyKWattHour": 1.0}
                ]}
            ]
        }"#;
        let windows = parse_energy_usage_response(body, 7).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].samples.len(), 3);
        assert_eq!(windows[0].samples[0].bucket, 0);
        assert_eq!(windows[0].samples[1].bucket, 1);
        assert_eq!(windows[0].samples[2].bucket, 2);
        assert_eq!(windows[0].samples[1].energy_kwh, 0.5);
        assert_eq!(windows[1].samples[0].bucket, 0);
    }

    #[test]
    fn parse_usage_truncates_to_window_count() {
        let body = r#"{
            "EnergyUsage": [
                {"Usage": [{"EnergyKWattHour": 1.0}]},
                {"Usage": [{"EnergyKWattHour": 2.0}]},
                {"Usage": [{"EnergyKWattHour": 3.0}]}
            ]
        }"#;
        let windows = parse_energy_usage_response(body, 2).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].samples[0].energy_kwh, 1.0);
        assert_eq!(windows[1].samples[0].energy_kwh, 2.0);
    }

    #[test]
    fn parse_usage_missing_day_list() {
        let err = parse_energy_usage_response("{}", 7).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        assert!(err.to_string().contains("EnergyUsage"));
    }

    #[test]
    fn parse_usage_day_missing_usage_key() {
        let body = r#"{"EnergyUsage": [{"Date": "01/01/2024"}]}"#;
        let err = parse_energy_usage_response(body, 7).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }), "expected Malformed, got {err:?}");
        assert!(err.to_string().contains("missing field `Usage`"));
    }

    #[test]
    fn parse_usage_rejects_negative_energy() {
        let body = r#"{"EnergyUsage": [{"Usage": [{"EnergyKWattHour": -0.5}]}]}"#;
        let err = parse_energy_usage_response(body, 7).unwrap_err();
        match err {
            Error::Malformed { path, .. } => assert!(path.contains("EnergyKWattHour")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn parse_usage_empty_day() {
        let body = r#"{"EnergyUsage": [{"Usage": []}]}"#;
        let windows = parse_energy_usage_response(body, 7).unwrap();
        assert_eq!(windows.len(), 1);
        assert!(windows[0].samples.is_empty());
    }
}
