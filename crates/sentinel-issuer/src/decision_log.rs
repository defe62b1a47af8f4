//! Signed decision log.
//!
//! Every evaluation outcome is appended as one JSON line. Each line
//! carries an HMAC-SHA256 over the previous line's MAC plus the record
//! body, keyed by a per-day subkey derived from the deployment secret.
//! The chain makes bit flips, line reordering, and prefix truncation all
//! detectable; [`verify_file`] walks it end to end.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sentinel_core::models::Effect;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::IssueError;

type HmacSha256 = Hmac<Sha256>;

const KEY_CONTEXT: &str = "sentinel-decision-log";

/// One evaluation outcome. The allow-only fields are present exactly when
/// the decision produced credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionRecord {
    /// RFC3339, pre-formatted so the signed bytes are stable.
    pub timestamp: String,
    pub user: String,
    pub profile: String,
    pub effect: Effect,
    pub rule: String,
    pub rule_index: i32,
    pub reason: String,
    pub policy_path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_duration_seconds: Option<i64>,
}

/// Wire form of one log line: the record plus the chain fields.
#[derive(Debug, Serialize, Deserialize)]
struct SignedLine {
    #[serde(flatten)]
    record: DecisionRecord,
    /// UTC date selecting the derived signing key.
    key_epoch: String,
    mac: String,
}

/// Append-only signed log bound to one file.
pub struct DecisionLog {
    path: PathBuf,
    secret: Vec<u8>,
    /// MAC of the last line, hex. Empty for a fresh file.
    last_mac: Mutex<String>,
}

impl DecisionLog {
    /// Open (or create) the log, recovering the chain tail from the
    /// existing file so appends continue it.
    pub fn open(path: impl Into<PathBuf>, secret: &[u8]) -> Result<Self, IssueError> {
        let path = path.into();
        let last_mac = match std::fs::File::open(&path) {
            Ok(file) => {
                let mut last = String::new();
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|e| IssueError::DecisionLog(e.to_string()))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let signed: SignedLine = serde_json::from_str(&line)
                        .map_err(|e| IssueError::DecisionLog(e.to_string()))?;
                    last = signed.mac;
                }
                last
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(IssueError::DecisionLog(e.to_string())),
        };

        Ok(Self {
            path,
            secret: secret.to_vec(),
            last_mac: Mutex::new(last_mac),
        })
    }

    /// Append one record, extending the MAC chain.
    pub fn append(&self, record: &DecisionRecord) -> Result<(), IssueError> {
        let key_epoch = key_epoch_for(&record.timestamp)?;
        let body = serde_json::to_string(record)
            .map_err(|e| IssueError::DecisionLog(e.to_string()))?;

        let mut last = self
            .last_mac
            .lock()
            .map_err(|_| IssueError::DecisionLog("log chain lock poisoned".to_string()))?;

        let mac = line_mac(&self.secret, &key_epoch, &last, &body);
        let line = serde_json::to_string(&SignedLine {
            record: record.clone(),
            key_epoch,
            mac: mac.clone(),
        })
        .map_err(|e| IssueError::DecisionLog(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IssueError::DecisionLog(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| IssueError::DecisionLog(e.to_string()))?;

        *last = mac;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Walk the whole file, recomputing the chain. Returns the verified
/// records; the first bad line aborts with its 1-based number.
pub fn verify_file(path: &Path, secret: &[u8]) -> Result<Vec<DecisionRecord>, IssueError> {
    let file = std::fs::File::open(path).map_err(|e| IssueError::DecisionLog(e.to_string()))?;

    let mut records = Vec::new();
    let mut prev_mac = String::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| IssueError::DecisionLog(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }

        let signed: SignedLine = serde_json::from_str(&line)
            .map_err(|_| IssueError::DecisionLogTampered { line: line_no })?;
        let body = serde_json::to_string(&signed.record)
            .map_err(|e| IssueError::DecisionLog(e.to_string()))?;

        let expected = line_mac(secret, &signed.key_epoch, &prev_mac, &body);
        if expected != signed.mac {
            return Err(IssueError::DecisionLogTampered { line: line_no });
        }

        prev_mac = signed.mac;
        records.push(signed.record);
    }
    Ok(records)
}

/// Derive the per-day signing key and MAC one line.
fn line_mac(secret: &[u8], key_epoch: &str, prev_mac: &str, body: &str) -> String {
    let mut derive = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    derive.update(KEY_CONTEXT.as_bytes());
    derive.update(b":");
    derive.update(key_epoch.as_bytes());
    let day_key = derive.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&day_key).expect("hmac accepts any key length");
    mac.update(prev_mac.as_bytes());
    mac.update(b"\n");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// The UTC date of the record's timestamp, e.g. `2026-01-20`.
fn key_epoch_for(timestamp: &str) -> Result<String, IssueError> {
    let ts: jiff::Timestamp = timestamp
        .parse()
        .map_err(|_| IssueError::DecisionLog(format!("bad record timestamp: {timestamp}")))?;
    let date = ts.to_zoned(jiff::tz::TimeZone::UTC).date();
    Ok(date.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, effect: Effect) -> DecisionRecord {
        DecisionRecord {
            timestamp: "2026-01-20T12:00:00Z".to_string(),
            user: user.to_string(),
            profile: "prod".to_string(),
            effect,
            rule: "business-hours".to_string(),
            rule_index: 0,
            reason: String::new(),
            policy_path: "/sentinel/access".to_string(),
            request_id: None,
            source_identity: None,
            role_arn: None,
            session_duration_seconds: None,
        }
    }

    fn temp_log() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        (dir, path)
    }

    #[test]
    fn append_then_verify() {
        let (_dir, path) = temp_log();
        let log = DecisionLog::open(&path, b"deployment-secret").unwrap();
        log.append(&record("alice", Effect::Allow)).unwrap();
        log.append(&record("bob", Effect::Deny)).unwrap();

        let records = verify_file(&path, b"deployment-secret").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user, "alice");
        assert_eq!(records[1].user, "bob");
    }

    #[test]
    fn bit_flip_detected() {
        let (_dir, path) = temp_log();
        let log = DecisionLog::open(&path, b"s").unwrap();
        log.append(&record("alice", Effect::Allow)).unwrap();
        log.append(&record("bob", Effect::Deny)).unwrap();

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"user\":\"alice\"", "\"user\":\"mallory\"");
        std::fs::write(&path, tampered).unwrap();

        assert!(matches!(
            verify_file(&path, b"s"),
            Err(IssueError::DecisionLogTampered { line: 1 })
        ));
    }

    #[test]
    fn prefix_truncation_detected() {
        let (_dir, path) = temp_log();
        let log = DecisionLog::open(&path, b"s").unwrap();
        log.append(&record("alice", Effect::Allow)).unwrap();
        log.append(&record("bob", Effect::Deny)).unwrap();

        // Drop the first line: line 2 chained on line 1's MAC, so the
        // now-first line fails against the empty genesis MAC.
        let contents = std::fs::read_to_string(&path).unwrap();
        let without_first: String = contents.lines().skip(1).collect::<Vec<_>>().join("\n");
        std::fs::write(&path, without_first).unwrap();

        assert!(matches!(
            verify_file(&path, b"s"),
            Err(IssueError::DecisionLogTampered { line: 1 })
        ));
    }

    #[test]
    fn reorder_detected() {
        let (_dir, path) = temp_log();
        let log = DecisionLog::open(&path, b"s").unwrap();
        log.append(&record("alice", Effect::Allow)).unwrap();
        log.append(&record("bob", Effect::Deny)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines.swap(0, 1);
        std::fs::write(&path, lines.join("\n")).unwrap();

        assert!(verify_file(&path, b"s").is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let (_dir, path) = temp_log();
        let log = DecisionLog::open(&path, b"right").unwrap();
        log.append(&record("alice", Effect::Allow)).unwrap();

        assert!(verify_file(&path, b"wrong").is_err());
    }

    #[test]
    fn reopen_continues_the_chain() {
        let (_dir, path) = temp_log();
        {
            let log = DecisionLog::open(&path, b"s").unwrap();
            log.append(&record("alice", Effect::Allow)).unwrap();
        }
        {
            let log = DecisionLog::open(&path, b"s").unwrap();
            log.append(&record("bob", Effect::Deny)).unwrap();
        }
        assert_eq!(verify_file(&path, b"s").unwrap().len(), 2);
    }

    #[test]
    fn allow_only_fields_omitted_when_absent() {
        let body = serde_json::to_string(&record("alice", Effect::Deny)).unwrap();
        assert!(!body.contains("request_id"));
        assert!(!body.contains("source_identity"));
        assert!(!body.contains("role_arn"));
    }
}
