use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use serde::Serialize;
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::AuditError;
use crate::config;
use crate::database::models::Tenant;

type HmacSha256 = Hmac<Sha256>;

pub const GLOBAL_LOG: &str = "audit_global.log";
pub const SIGNATURE_SEPARATOR: &str = "::";
const TENANT_DIR: &str = "tenants";
const PREVIEW_LEN: usize = 100;

// Size check, rename chain and append must not interleave between writers.
static WRITE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn write_lock() -> MutexGuard<'static, ()> {
    WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidEntry {
    pub line: usize,
    pub error: String,
    pub content: String,
}

/// Lines are `json::signature`, the signature being a hex HMAC-SHA256 of
/// the JSON keyed by salt and key.
#[derive(Debug, Clone)]
pub struct SecureAuditLog {
    dir: PathBuf,
    key: Vec<u8>,
    max_log_size: u64,
    backup_count: u32,
}

impl SecureAuditLog {
    pub fn new(dir: impl Into<PathBuf>, salt: &str, key: &str, max_log_size: u64, backup_count: u32) -> Self {
        Self {
            dir: dir.into(),
            key: format!("{}{}", salt, key).into_bytes(),
            max_log_size,
            backup_count,
        }
    }

    pub fn from_config() -> Self {
        let audit = &config::config().audit;
        Self::new(
            audit.log_dir.clone(),
            &audit.signing_salt,
            &audit.signing_key,
            audit.max_log_size,
            audit.backup_count,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn global_log_path(&self) -> PathBuf {
        self.dir.join(GLOBAL_LOG)
    }

    pub fn tenant_log_path(&self, tenant_id: i64) -> PathBuf {
        self.dir.join(TENANT_DIR).join(format!("tenant_{}.log", tenant_id))
    }

    fn mac(&self) -> Result<HmacSha256, AuditError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| AuditError::Signing(e.to_string()))
    }

    pub fn sign(&self, payload: &str) -> Result<String, AuditError> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}{}{}", payload, SIGNATURE_SEPARATOR, signature))
    }

    /// Checks one signed line and returns its payload
    pub fn unsign<'a>(&self, line: &'a str) -> Result<&'a str, AuditError> {
        let (payload, signature) = line
            .rsplit_once(SIGNATURE_SEPARATOR)
            .ok_or_else(|| AuditError::BadSignature("No separator found in value".to_string()))?;
        let signature = hex::decode(signature)
            .map_err(|_| AuditError::BadSignature(format!("Signature \"{}\" is not valid hex", signature)))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuditError::BadSignature("Signature does not match".to_string()))?;
        Ok(payload)
    }

    /// Signs the entry and appends it to the global log and, when given,
    /// the tenant log.
    pub fn append(&self, payload: &str, tenant_id: Option<i64>) -> Result<(), AuditError> {
        let line = self.sign(payload)?;
        let _guard = write_lock();
        self.append_line(&self.global_log_path(), &line)?;
        if let Some(tenant_id) = tenant_id {
            self.append_line(&self.tenant_log_path(tenant_id), &line)?;
        }
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), AuditError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed(path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Once `path` exceeds the size limit it becomes `path.1`, older copies
    /// shift up and anything past `backup_count` is dropped. Callers hold
    /// the write lock.
    fn rotate_if_needed(&self, path: &Path) -> Result<bool, AuditError> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(false),
        };
        if size < self.max_log_size {
            return Ok(false);
        }

        if self.backup_count == 0 {
            fs::remove_file(path)?;
            return Ok(true);
        }
        let numbered = |n: u32| PathBuf::from(format!("{}.{}", path.display(), n));
        let oldest = numbered(self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backup_count).rev() {
            let from = numbered(n);
            if from.exists() {
                fs::rename(&from, numbered(n + 1))?;
            }
        }
        fs::rename(path, numbered(1))?;
        tracing::info!("Rotated audit log {}", path.display());
        Ok(true)
    }

    /// Makes sure the tenant's log file exists
    pub async fn prepare_tenant_log(&self, tenant: &Tenant) -> Result<PathBuf, AuditError> {
        let path = self.tenant_log_path(tenant.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(path)
    }

    /// (all lines valid, offending lines)
    pub fn verify_log_integrity(&self, path: &Path) -> (bool, Vec<InvalidEntry>) {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) => {
                return (
                    false,
                    vec![InvalidEntry {
                        line: 0,
                        error: format!("Error al leer el archivo: {}", e),
                        content: String::new(),
                    }],
                )
            }
        };
        let invalid = self.verify_lines(BufReader::new(file));
        (invalid.is_empty(), invalid)
    }

    pub fn verify_lines(&self, reader: impl BufRead) -> Vec<InvalidEntry> {
        let mut invalid = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    invalid.push(InvalidEntry {
                        line: index + 1,
                        error: e.to_string(),
                        content: String::new(),
                    });
                    continue;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = self.unsign(line) {
                invalid.push(InvalidEntry {
                    line: index + 1,
                    error: e.to_string(),
                    content: preview(line),
                });
            }
        }
        invalid
    }
}

fn preview(line: &str) -> String {
    if line.chars().count() > PREVIEW_LEN {
        format!("{}...", line.chars().take(PREVIEW_LEN).collect::<String>())
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tienda-audit-{}-{}", name, uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn signed_lines_verify_and_tampering_is_detected() {
        let log = SecureAuditLog::new(temp_dir("sign"), "salt", "key", 1024, 2);
        let line = log.sign(r#"{"action":"login"}"#).unwrap();
        assert_eq!(log.unsign(&line).unwrap(), r#"{"action":"login"}"#);

        let tampered = line.replace("login", "logout");
        assert!(log.unsign(&tampered).is_err());
        assert!(log.unsign("no separator").is_err());

        let other_key = SecureAuditLog::new(log.dir(), "salt", "other", 1024, 2);
        assert!(other_key.unsign(&line).is_err());
    }

    #[test]
    fn appends_to_global_and_tenant_logs() {
        let log = SecureAuditLog::new(temp_dir("append"), "salt", "key", 1024 * 1024, 2);
        log.append(r#"{"n":1}"#, Some(9)).unwrap();
        log.append(r#"{"n":2}"#, None).unwrap();

        let global = fs::read_to_string(log.global_log_path()).unwrap();
        let tenant = fs::read_to_string(log.tenant_log_path(9)).unwrap();
        assert_eq!(global.lines().count(), 2);
        assert_eq!(tenant.lines().count(), 1);

        let (valid, invalid) = log.verify_log_integrity(&log.global_log_path());
        assert!(valid, "{:?}", invalid);
    }

    #[test]
    fn verification_reports_offending_lines() {
        let log = SecureAuditLog::new(temp_dir("verify"), "salt", "key", 1024 * 1024, 2);
        log.append(r#"{"n":1}"#, None).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.global_log_path()).unwrap();
        writeln!(file, "forged line::deadbeef").unwrap();

        let (valid, invalid) = log.verify_log_integrity(&log.global_log_path());
        assert!(!valid);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].line, 2);
        assert_eq!(invalid[0].content, "forged line::deadbeef");
    }

    #[test]
    fn rotation_keeps_numbered_copies() {
        let log = SecureAuditLog::new(temp_dir("rotate"), "salt", "key", 10, 2);
        for n in 0..4 {
            log.append(&format!(r#"{{"entry":{}}}"#, n), None).unwrap();
        }
        let global = log.global_log_path();
        assert!(global.exists());
        assert!(PathBuf::from(format!("{}.1", global.display())).exists());
        assert!(PathBuf::from(format!("{}.2", global.display())).exists());
        assert!(!PathBuf::from(format!("{}.3", global.display())).exists());
    }

    #[test]
    fn concurrent_writers_rotate_without_losing_entries() {
        let log = SecureAuditLog::new(temp_dir("concurrent"), "salt", "key", 200, 50);
        let handles: Vec<_> = (0..16)
            .map(|thread| {
                let log = log.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .filter_map(|n| log.append(&format!(r#"{{"t":{},"n":{}}}"#, thread, n), None).err())
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let failures: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert!(failures.is_empty(), "failed appends: {} e.g. {:?}", failures.len(), failures.first());

        let global = log.global_log_path();
        let (valid, invalid) = log.verify_log_integrity(&global);
        assert!(valid, "{:?}", invalid);
    }

    #[test]
    fn missing_file_is_invalid() {
        let log = SecureAuditLog::new(temp_dir("missing"), "salt", "key", 10, 2);
        let (valid, invalid) = log.verify_log_integrity(&log.dir().join("nope.log"));
        assert!(!valid);
        assert!(invalid[0].error.starts_with("Error al leer el archivo"));
    }
}
