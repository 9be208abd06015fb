//! HTTP-shaped handlers.
//!
//! The routing layer is left to the embedding server: each handler returns the status code and
//! the JSON body to send back, and never fails.

use std::net::IpAddr;

use chrono::Utc;
use log::error;
use procwatch_shared::ErrorBody;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(err: StoreError) -> Self {
        if !err.is_client_error() {
            error!("Request failed: {err}");
        }
        let body = ErrorBody {
            error: err.label().to_string(),
            details: err.details(),
        };
        Self {
            status: err.status_code(),
            body: to_value(&body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// `POST processes/`: ingest one snapshot sent by an agent
pub async fn post_processes(
    store: &SnapshotStore,
    body: &[u8],
    remote_addr: Option<IpAddr>,
) -> ApiResponse {
    match store.ingest(body, remote_addr).await {
        Ok(receipt) => ApiResponse::ok(to_value(&receipt)),
        Err(err) => ApiResponse::error(err),
    }
}

/// `GET processes/get/`: latest snapshot of every active host, newest first
pub async fn get_processes(store: &SnapshotStore) -> ApiResponse {
    match store.latest_snapshots().await {
        Ok(snapshots) if snapshots.is_empty() => ApiResponse::ok(json!({
            "message": "No snapshots found",
            "data": [],
        })),
        Ok(snapshots) => ApiResponse::ok(json!({
            "message": "Success",
            "total_hosts": snapshots.len(),
            "data": to_value(&snapshots),
        })),
        Err(err) => ApiResponse::error(err),
    }
}

/// `GET hosts/`: active hosts
pub async fn get_hosts(store: &SnapshotStore) -> ApiResponse {
    match store.list_hosts().await {
        Ok(hosts) => ApiResponse::ok(json!({
            "message": "Success",
            "total_hosts": hosts.len(),
            "data": to_value(&hosts),
        })),
        Err(err) => ApiResponse::error(err),
    }
}

/// `GET hosts/<hostname>/processes/`: latest snapshot of one host
pub async fn get_host_processes(store: &SnapshotStore, hostname: &str) -> ApiResponse {
    match store.host_snapshot(hostname).await {
        Ok(Some(snapshot)) => ApiResponse::ok(json!({
            "message": "Success",
            "data": to_value(&snapshot),
        })),
        Ok(None) => ApiResponse::ok(json!({
            "message": format!("No snapshots found for host {hostname}"),
            "data": null,
        })),
        Err(err) => ApiResponse::error(err),
    }
}

/// `DELETE clear-old-data/`: apply the retention window
pub async fn clear_old_data(store: &SnapshotStore) -> ApiResponse {
    match store.clear_old_data(Utc::now()).await {
        Ok(deleted_count) => ApiResponse::ok(json!({
            "message": format!("Cleared {deleted_count} old snapshots"),
            "deleted_count": deleted_count,
        })),
        Err(err) => ApiResponse::error(err),
    }
}
