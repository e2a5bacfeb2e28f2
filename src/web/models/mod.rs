use serde::{Deserialize, Serialize};

use crate::db::enums::UserRole;

// --- Operator auth ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i32,
    pub role: UserRole,
    pub exp: usize,
}

/// Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
    pub role: UserRole,
}

// --- Device-facing payloads ---

#[derive(Debug, Deserialize)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentCounters {
    #[serde(default)]
    pub basic: Option<i32>,
    #[serde(default)]
    pub standard: Option<i32>,
    #[serde(default)]
    pub premium: Option<i32>,
}

/// Event submission from the current firmware protocol. Counters and
/// timestamps arrive with loose typing; the ingest service coerces them.
#[derive(Debug, Deserialize)]
pub struct DeviceEventRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub counter: Option<serde_json::Value>,
    #[serde(default)]
    pub ts: Option<serde_json::Value>,
    #[serde(default)]
    pub current_counters: Option<CurrentCounters>,
}

/// Legacy form-urlencoded ingest payload, everything optional strings.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyIngestRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub macaddr: Option<String>,
    #[serde(default)]
    pub type1: Option<String>,
    #[serde(default)]
    pub type2: Option<String>,
    #[serde(default)]
    pub type3: Option<String>,
    #[serde(default)]
    pub count1: Option<String>,
    #[serde(default)]
    pub count2: Option<String>,
    #[serde(default)]
    pub count3: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub rtc_available: Option<String>,
    #[serde(default)]
    pub sd_available: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommandResultRequest {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response_data: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub current_counters: Option<CurrentCounters>,
}

// --- Operator-facing payloads ---

#[derive(Debug, Deserialize)]
pub struct CreateCommandRequest {
    pub command_type: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCommandRequest {
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub command_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BindDeviceRequest {
    pub machine_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct OutletRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignMachineRequest {
    pub machine_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateMachineRequest {
    pub name: String,
    #[serde(default)]
    pub machine_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignOutletRequest {
    pub outlet_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub outlet_id: Option<i32>,
    #[serde(default)]
    pub machine_id: Option<i32>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub cumulative: Option<String>,
    #[serde(default)]
    pub ma: Option<usize>,
    #[serde(default)]
    pub compare: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsOptionsParams {
    #[serde(default)]
    pub outlet_id: Option<i32>,
    #[serde(default)]
    pub machine_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub device_id: Option<String>,
    #[serde(default)]
    pub days: Option<i64>,
}
