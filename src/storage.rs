// Storage module - writes verdict reports to disk in JSON Lines format
//
// JSON Lines (JSONL) writes one JSON object per line, making it easy to:
// - Stream process large files
// - Grep/search with standard tools
// - Parse with jq or other JSON tools
//
// Each run gets its own audit file: vigil-YYYYMMDD-HHMMSS-XXXX.jsonl
// Example: jq '.verdict' logs/vigil-20260801-143022-a7b3.jsonl

use crate::analyzer::{VerdictHook, VerdictReport};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handles writing verdict reports to a JSON Lines file
pub struct AuditLog {
    log_dir: PathBuf,
    session_id: String,
    report_rx: mpsc::UnboundedReceiver<VerdictReport>,
}

impl AuditLog {
    /// Create a new audit writer; each run gets its own file based on
    /// `session_id`.
    pub fn new(
        log_dir: PathBuf,
        session_id: String,
        report_rx: mpsc::UnboundedReceiver<VerdictReport>,
    ) -> Result<Self> {
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        Ok(Self {
            log_dir,
            session_id,
            report_rx,
        })
    }

    /// Path of this run's audit file.
    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(format!("vigil-{}.jsonl", self.session_id))
    }

    /// Run the audit loop, writing reports as they arrive. Finishes when
    /// every sender (i.e. every verdict hook) is gone.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("audit log started: {:?}", self.log_file_path());

        while let Some(report) = self.report_rx.recv().await {
            if let Err(e) = self.write_report(&report) {
                tracing::error!("failed to write verdict report: {e:?}");
                // keep consuming even if one write fails
            }
        }

        tracing::info!("audit log shutting down");
        Ok(())
    }

    /// Append a single report to the audit file.
    fn write_report(&self, report: &VerdictReport) -> Result<()> {
        let path = self.log_file_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open audit file")?;

        let json = serde_json::to_string(report).context("Failed to serialize report")?;
        writeln!(file, "{}", json).context("Failed to write audit file")?;
        file.flush().context("Failed to flush audit file")?;
        Ok(())
    }
}

/// Bridge a verdict hook onto an audit channel.
pub fn audit_hook(report_tx: mpsc::UnboundedSender<VerdictReport>) -> VerdictHook {
    Arc::new(move |report: &VerdictReport| {
        // a closed channel means the audit task is gone; verdicts still
        // reach the log via tracing
        let _ = report_tx.send(report.clone());
    })
}

/// Unique id for this run's audit file.
/// Format: YYYYMMDD-HHMMSS-XXXX (timestamp + 4 random hex chars)
pub fn session_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    // RandomState gives a random value without adding a dependency
    let random = RandomState::new().build_hasher().finish();
    let short_hash = format!("{:04x}", random & 0xFFFF);

    format!("{}-{}", timestamp, short_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Verdict;

    fn report(verdict: Verdict) -> VerdictReport {
        VerdictReport {
            verdict,
            monitor: verdict.to_string(),
            at: Utc::now(),
            proof: Vec::new(),
        }
    }

    #[test]
    fn test_reports_are_written_as_json_lines() {
        let dir = std::env::temp_dir().join(format!("vigil-test-{}", session_id()));
        let (_tx, rx) = mpsc::unbounded_channel();
        let audit = AuditLog::new(dir.clone(), "unit".to_string(), rx).unwrap();

        audit.write_report(&report(Verdict::Yes)).unwrap();
        audit.write_report(&report(Verdict::No)).unwrap();

        let text = fs::read_to_string(audit.log_file_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["verdict"], "yes");
        assert_eq!(second["verdict"], "no");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_session_ids_are_distinct() {
        assert_ne!(session_id(), session_id());
    }

    #[tokio::test]
    async fn test_hook_feeds_the_audit_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hook = audit_hook(tx);
        hook(&report(Verdict::No));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.verdict, Verdict::No);
    }
}
