use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use procwatch_shared::{IngestReceipt, parse_timestamp, timestamp_from_epoch_secs};
use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use crate::error::{Result, StoreError};
use crate::store::SnapshotStore;

const MAX_HOSTNAME_LEN: usize = 255;
const DEFAULT_STATUS: &str = "running";

/// A payload that passed validation, ready to be written
#[derive(Debug)]
pub(crate) struct ValidatedPayload {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub processes: Vec<IncomingProcess>,
    pub api_key: Option<String>,
}

#[derive(Debug)]
pub(crate) struct IncomingProcess {
    pub pid: i64,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub parent_pid: Option<i64>,
    pub command_line: String,
    pub status: String,
    pub create_time: Option<DateTime<Utc>>,
}

/// Parse a `create_time` value without ever failing: epoch seconds (number or numeric string) or
/// an ISO-8601 string. Anything else is stored as absent.
pub(crate) fn parse_create_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number.as_f64().and_then(timestamp_from_epoch_secs),
        Value::String(raw) => match raw.trim().parse::<f64>() {
            Ok(secs) => timestamp_from_epoch_secs(secs),
            Err(_) => parse_timestamp(raw),
        },
        _ => None,
    }
}

fn validate_process(index: usize, value: &Value) -> Result<IncomingProcess> {
    let entry = value.as_object().ok_or_else(|| {
        StoreError::validation("processes", format!("Process {index} is not an object"))
    })?;

    let missing =
        |field: &str| StoreError::validation("processes", format!("Process missing required field: {field}"));
    let pid = match entry.get("pid") {
        None | Some(Value::Null) => return Err(missing("pid")),
        Some(pid) => pid.as_i64().ok_or_else(|| {
            StoreError::validation("processes", format!("Process {index} has a non-integer pid"))
        })?,
    };
    let name = match entry.get("name") {
        None | Some(Value::Null) => return Err(missing("name")),
        Some(name) => name.as_str().ok_or_else(|| {
            StoreError::validation("processes", format!("Process {index} has a non-string name"))
        })?,
    };

    let create_time = match entry.get("create_time") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let parsed = parse_create_time(raw);
            if parsed.is_none() {
                warn!("Invalid create_time format for process {index}: {raw}");
            }
            parsed
        }
    };

    Ok(IncomingProcess {
        pid,
        name: name.to_string(),
        cpu_percent: number_or_zero(entry, "cpu_percent"),
        memory_mb: number_or_zero(entry, "memory_mb"),
        parent_pid: entry.get("parent_pid").and_then(Value::as_i64),
        command_line: entry
            .get("command_line")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: entry
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_STATUS)
            .to_string(),
        create_time,
    })
}

fn number_or_zero(entry: &Map<String, Value>, field: &str) -> f64 {
    entry
        .get(field)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Validate the shape of an inbound payload.
///
/// A malformed `timestamp` is not an error: `received_at` is used instead.
pub(crate) fn validate(value: &Value, received_at: DateTime<Utc>) -> Result<ValidatedPayload> {
    let body = value
        .as_object()
        .ok_or_else(|| StoreError::validation("non_field_errors", "Expected a JSON object"))?;

    let hostname = match body.get("hostname") {
        None | Some(Value::Null) => {
            return Err(StoreError::validation("hostname", "This field is required."));
        }
        Some(hostname) => hostname
            .as_str()
            .ok_or_else(|| StoreError::validation("hostname", "Not a valid string."))?
            .trim(),
    };
    if hostname.is_empty() {
        return Err(StoreError::validation("hostname", "This field may not be blank."));
    }
    if hostname.chars().count() > MAX_HOSTNAME_LEN {
        return Err(StoreError::validation(
            "hostname",
            format!("Ensure this field has no more than {MAX_HOSTNAME_LEN} characters."),
        ));
    }

    let raw_processes = match body.get("processes") {
        None | Some(Value::Null) => {
            return Err(StoreError::validation("processes", "This field is required."));
        }
        Some(processes) => processes
            .as_array()
            .ok_or_else(|| StoreError::validation("processes", "Expected a list of items."))?,
    };

    let mut seen_pids = HashSet::with_capacity(raw_processes.len());
    let mut processes = Vec::with_capacity(raw_processes.len());
    for (index, raw) in raw_processes.iter().enumerate() {
        let process = validate_process(index, raw)?;
        if !seen_pids.insert(process.pid) {
            return Err(StoreError::validation(
                "processes",
                format!("Duplicate pid {} in snapshot", process.pid),
            ));
        }
        processes.push(process);
    }

    let timestamp = match body.get("timestamp").and_then(Value::as_str) {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
            warn!("Timestamp parsing error for {raw:?}, using current time");
            received_at
        }),
        None => {
            warn!("Missing or non-string timestamp, using current time");
            received_at
        }
    };

    Ok(ValidatedPayload {
        hostname: hostname.to_string(),
        timestamp,
        processes,
        api_key: body
            .get("api_key")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

async fn upsert_host(
    conn: &mut SqliteConnection,
    hostname: &str,
    remote_addr: Option<IpAddr>,
    seen_at: DateTime<Utc>,
) -> Result<i64> {
    let seen_at = seen_at.timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO hosts (hostname, ip_address, first_seen, last_seen, is_active)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT(hostname) DO UPDATE SET
            last_seen = excluded.last_seen,
            ip_address = COALESCE(excluded.ip_address, hosts.ip_address)
        "#,
    )
    .bind(hostname)
    .bind(remote_addr.map(|addr| addr.to_string()))
    .bind(seen_at)
    .bind(seen_at)
    .execute(&mut *conn)
    .await?;

    let host_id: i64 = sqlx::query_scalar("SELECT id FROM hosts WHERE hostname = ?")
        .bind(hostname)
        .fetch_one(&mut *conn)
        .await?;
    Ok(host_id)
}

async fn insert_process(
    conn: &mut SqliteConnection,
    snapshot_id: i64,
    process: &IncomingProcess,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO processes (snapshot_id, pid, name, cpu_percent, memory_mb, parent_pid,
                               command_line, status, create_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot_id)
    .bind(process.pid)
    .bind(&process.name)
    .bind(process.cpu_percent)
    .bind(process.memory_mb)
    .bind(process.parent_pid)
    .bind(&process.command_line)
    .bind(&process.status)
    .bind(process.create_time.map(|t| t.timestamp_millis()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl SnapshotStore {
    /// Ingest a raw request body, see [`SnapshotStore::ingest_value`]
    pub async fn ingest(&self, body: &[u8], remote_addr: Option<IpAddr>) -> Result<IngestReceipt> {
        let value: Value = serde_json::from_slice(body)?;
        self.ingest_value(&value, remote_addr).await
    }

    /// Validate and persist one snapshot payload.
    ///
    /// The host upsert, the snapshot row, its process rows and the aggregate totals are written
    /// in a single transaction: on any failure nothing is kept.
    pub async fn ingest_value(
        &self,
        value: &Value,
        remote_addr: Option<IpAddr>,
    ) -> Result<IngestReceipt> {
        let received_at = Utc::now();
        let payload = validate(value, received_at)?;
        if let Some(expected) = &self.api_key {
            if payload.api_key.as_deref() != Some(expected.as_str()) {
                return Err(StoreError::Unauthorized);
            }
        }
        debug!(
            "Received data for host {} with {} processes",
            payload.hostname,
            payload.processes.len()
        );

        let mut tx = self.pool.begin().await?;
        let host_id = upsert_host(&mut tx, &payload.hostname, remote_addr, received_at).await?;

        let snapshot_id = sqlx::query(
            "INSERT INTO snapshots (host_id, timestamp, total_processes) VALUES (?, ?, ?)",
        )
        .bind(host_id)
        .bind(payload.timestamp.timestamp_millis())
        .bind(payload.processes.len() as i64)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut total_cpu = 0.0;
        let mut total_memory = 0.0;
        for process in &payload.processes {
            insert_process(&mut tx, snapshot_id, process).await?;
            total_cpu += process.cpu_percent;
            total_memory += process.memory_mb;
        }

        sqlx::query("UPDATE snapshots SET total_cpu_percent = ?, total_memory_mb = ? WHERE id = ?")
            .bind(total_cpu)
            .bind(total_memory)
            .bind(snapshot_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            "Stored snapshot {snapshot_id} for {} ({} processes)",
            payload.hostname,
            payload.processes.len()
        );
        Ok(IngestReceipt::success(snapshot_id, payload.processes.len()))
    }
}
