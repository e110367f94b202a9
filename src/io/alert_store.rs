//! Durable emergency alert store - appends alerts to file
//!
//! Alerts are written in JSONL format (one JSON object per line) before
//! fan-out. A write failure is logged but never blocks broadcast; delivery
//! to connected peers takes priority over the durable copy.

use crate::domain::types::EmergencyAlert;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Append-only store for emergency alerts
pub struct AlertStore {
    file_path: String,
}

impl AlertStore {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "alert_store_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append an alert to the store
    /// Returns true if successful, false otherwise
    pub fn append(&self, alert: &EmergencyAlert) -> bool {
        let json = match serde_json::to_string(alert) {
            Ok(json) => json,
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "alert_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    alert_id = %alert.id,
                    user_id = %alert.user_id,
                    "alert_persisted"
                );
                true
            }
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    error = %e,
                    "alert_persist_failed"
                );
                false
            }
        }
    }

    /// Append a line to the store file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "alert_written");

        Ok(())
    }
}
