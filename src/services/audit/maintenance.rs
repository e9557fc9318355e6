use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use super::secure_log::{InvalidEntry, SecureAuditLog, GLOBAL_LOG};
use super::AuditError;

const TAIL_LINES: usize = 5;

#[derive(Debug, Serialize)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub directory: PathBuf,
    pub directory_exists: bool,
    pub global_log: Option<LogFileInfo>,
    pub global_tail: Vec<String>,
    pub tenant_log_count: usize,
    pub recent_tenant_logs: Vec<LogFileInfo>,
}

#[derive(Debug, Serialize)]
pub struct VerifiedFile {
    pub path: PathBuf,
    pub valid: bool,
    pub invalid_entries: Vec<InvalidEntry>,
}

#[derive(Debug, Default, Serialize)]
pub struct MaintenanceReport {
    pub dry_run: bool,
    pub compressed: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub verified: Vec<VerifiedFile>,
    pub errors: Vec<String>,
}

/// Every regular file below `dir`, depth first
fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(walk(&path));
        } else {
            files.push(path);
        }
    }
    files
}

fn file_info(path: &Path) -> Option<LogFileInfo> {
    let meta = fs::metadata(path).ok()?;
    Some(LogFileInfo {
        path: path.to_path_buf(),
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    })
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Rotated copies (`x.log.N`) and tenant logs are archived; the live
/// global log never is.
pub fn should_compress(path: &Path) -> bool {
    let name = file_name(path);
    if name == GLOBAL_LOG || name.ends_with(".zip") {
        return false;
    }
    name.ends_with(".log") || name.contains(".log.")
}

pub fn check(log: &SecureAuditLog) -> CheckReport {
    let dir = log.dir();
    let global = log.global_log_path();
    let global_tail = fs::read_to_string(&global)
        .map(|content| {
            let lines: Vec<&str> = content.lines().collect();
            lines[lines.len().saturating_sub(TAIL_LINES)..]
                .iter()
                .map(|l| l.to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut tenant_logs: Vec<LogFileInfo> = walk(&dir.join("tenants"))
        .iter()
        .filter(|p| file_name(p).ends_with(".log"))
        .filter_map(|p| file_info(p))
        .collect();
    tenant_logs.sort_by(|a, b| b.modified.cmp(&a.modified));
    let tenant_log_count = tenant_logs.len();
    tenant_logs.truncate(TAIL_LINES);

    CheckReport {
        directory: dir.to_path_buf(),
        directory_exists: dir.is_dir(),
        global_log: file_info(&global),
        global_tail,
        tenant_log_count,
        recent_tenant_logs: tenant_logs,
    }
}

pub fn maintain(log: &SecureAuditLog, retention_days: i64, dry_run: bool) -> MaintenanceReport {
    let mut report = MaintenanceReport {
        dry_run,
        ..Default::default()
    };
    let dir = log.dir();

    for path in walk(dir).into_iter().filter(|p| should_compress(p)) {
        if dry_run {
            report.compressed.push(path);
            continue;
        }
        match compress(&path) {
            Ok(archive) => report.compressed.push(archive),
            Err(e) => report.errors.push(format!("Error al comprimir {}: {}", path.display(), e)),
        }
    }

    let cutoff = Utc::now() - Duration::days(retention_days);
    for path in walk(dir) {
        let expired = file_info(&path).and_then(|info| info.modified).is_some_and(|m| m < cutoff);
        if !expired {
            continue;
        }
        if !dry_run {
            if let Err(e) = fs::remove_file(&path) {
                report.errors.push(format!("Error al eliminar {}: {}", path.display(), e));
                continue;
            }
        }
        report.deleted.push(path);
    }

    for path in walk(dir) {
        let name = file_name(&path);
        if !(name.ends_with(".log") || name.contains(".log.")) || name.ends_with(".zip") {
            continue;
        }
        let (valid, invalid_entries) = log.verify_log_integrity(&path);
        if !valid {
            tracing::warn!("Audit log {} has {} invalid lines", path.display(), invalid_entries.len());
        }
        report.verified.push(VerifiedFile {
            path,
            valid,
            invalid_entries,
        });
    }

    report
}

/// Writes `path` into `path.zip`, checks the archive reads back and
/// removes the original.
fn compress(path: &Path) -> Result<PathBuf, AuditError> {
    let archive_path = PathBuf::from(format!("{}.zip", path.display()));
    let content = fs::read(path)?;

    let result = (|| -> Result<(), AuditError> {
        let file = fs::File::create(&archive_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(file_name(path), options)?;
        zip.write_all(&content)?;
        zip.finish()?;

        let mut archive = zip::ZipArchive::new(fs::File::open(&archive_path)?)?;
        let mut restored = Vec::with_capacity(content.len());
        archive.by_index(0)?.read_to_end(&mut restored)?;
        if restored != content {
            return Err(AuditError::Archive("compressed copy does not match".to_string()));
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::remove_file(path)?;
            tracing::info!("Compressed audit log {}", path.display());
            Ok(archive_path)
        }
        Err(e) => {
            let _ = fs::remove_file(&archive_path);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> SecureAuditLog {
        let dir = std::env::temp_dir().join(format!("tienda-maint-{}-{}", name, uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        SecureAuditLog::new(dir, "salt", "key", 1024 * 1024, 3)
    }

    #[test]
    fn only_rotated_and_tenant_logs_are_compressed() {
        assert!(!should_compress(Path::new("/x/audit_global.log")));
        assert!(should_compress(Path::new("/x/audit_global.log.1")));
        assert!(should_compress(Path::new("/x/tenants/tenant_3.log")));
        assert!(!should_compress(Path::new("/x/tenants/tenant_3.log.zip")));
        assert!(!should_compress(Path::new("/x/notes.txt")));
    }

    #[test]
    fn check_reports_tail_and_tenant_logs() {
        let log = temp_log("check");
        for n in 0..7 {
            log.append(&format!(r#"{{"n":{}}}"#, n), Some(n % 2)).unwrap();
        }
        let report = check(&log);
        assert!(report.directory_exists);
        assert_eq!(report.global_tail.len(), 5);
        assert!(report.global_tail[4].starts_with(r#"{"n":6}"#));
        assert_eq!(report.tenant_log_count, 2);
    }

    #[test]
    fn maintain_compresses_and_verifies() {
        let log = temp_log("maintain");
        log.append(r#"{"n":1}"#, Some(4)).unwrap();

        let dry = maintain(&log, 365, true);
        assert_eq!(dry.compressed.len(), 1);
        assert!(log.tenant_log_path(4).exists());

        let report = maintain(&log, 365, false);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(!log.tenant_log_path(4).exists());
        assert!(PathBuf::from(format!("{}.zip", log.tenant_log_path(4).display())).exists());
        assert_eq!(report.verified.len(), 1);
        assert!(report.verified[0].valid);
    }
}
