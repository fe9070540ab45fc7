use std::env;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;

use crate::constants::MIN_BACKUP_SIZE;
use crate::error::TransportError;
use crate::transport::DeviceTransport;
use crate::utils::content_rows::{parse_content_rows, ContentRow, NO_RESULT};

#[cfg(windows)]
const ADB_BINARY: &str = "adb.exe";
#[cfg(not(windows))]
const ADB_BINARY: &str = "adb";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const ROOT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Short stdout that starts like this is an error message, not file content
const INLINE_ERROR_PREFIXES: [&[u8]; 3] = [b"cat: ", b"su: ", b"/system/bin/sh: "];
const INLINE_ERROR_MAX_LEN: usize = 512;

/// [`DeviceTransport`] backed by the `adb` command-line tool
pub struct AdbTransport {
    adb_path: PathBuf,
    serial: Option<String>,
    command_timeout: Duration,
    /// Set once root was obtained through `su` rather than a root adbd
    use_su: AtomicBool,
}

impl AdbTransport {
    /// Use the first `adb` found on PATH or in a standard SDK location
    pub fn new(command_timeout: Duration) -> Self {
        let adb_path = locate_adb().unwrap_or_else(|| PathBuf::from(ADB_BINARY));
        Self::with_path(adb_path, command_timeout)
    }

    pub fn with_path(adb_path: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        AdbTransport {
            adb_path: adb_path.into(),
            serial: None,
            command_timeout,
            use_su: AtomicBool::new(false),
        }
    }

    /// Address one device when several are connected
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str], limit: Duration) -> Result<Output, TransportError> {
        debug!("Running {} {}", self.adb_path.display(), args.join(" "));

        let result = tokio::time::timeout(limit, self.command(args).output()).await;
        match result {
            Err(_) => Err(TransportError::Timeout(limit)),
            Ok(Err(e)) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                Err(TransportError::ToolUnavailable(format!("{}: {}", self.adb_path.display(), e)))
            }
            Ok(Err(e)) => Err(TransportError::DeviceUnreachable(format!("failed to run adb: {}", e))),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Run a device shell command, through `su` when root came from it
    async fn shell(&self, mode: &str, command: &str) -> Result<Output, TransportError> {
        if self.use_su.load(Ordering::Relaxed) {
            let wrapped = quote_shell_arg(command);
            self.run(&[mode, "su", "-c", &wrapped], self.command_timeout).await
        } else {
            self.run(&[mode, "sh", "-c", &quote_shell_arg(command)], self.command_timeout).await
        }
    }

    async fn reports_root(&self, args: &[&str]) -> bool {
        match self.run(args, PROBE_TIMEOUT).await {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains("uid=0"),
            Err(e) => {
                debug!("Root probe {:?} failed: {}", args, e);
                false
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for AdbTransport {
    async fn is_tool_available(&self) -> bool {
        match self.run(&["version"], PROBE_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                debug!("{}", version.lines().next().unwrap_or("adb"));
                true
            }
            Ok(output) => {
                warn!("adb version failed: {}", String::from_utf8_lossy(&output.stderr).trim());
                false
            }
            Err(e) => {
                warn!("adb is not usable: {}", e);
                false
            }
        }
    }

    async fn list_connected_devices(&self) -> Result<Vec<String>, TransportError> {
        let output = self.run(&["devices"], self.command_timeout).await?;
        if !output.status.success() {
            return Err(TransportError::DeviceUnreachable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let devices = parse_device_list(&String::from_utf8_lossy(&output.stdout));
        Ok(pinned_devices(devices, self.serial.as_deref()))
    }

    async fn attempt_elevated_access(&self) -> bool {
        if let Err(e) = self.run(&["root"], self.command_timeout).await {
            debug!("adb root failed: {}", e);
        }
        tokio::time::sleep(ROOT_SETTLE_DELAY).await;

        if self.reports_root(&["shell", "id"]).await {
            info!("adbd is running as root");
            self.use_su.store(false, Ordering::Relaxed);
            return true;
        }
        if self.reports_root(&["shell", "su", "-c", "id"]).await {
            info!("Root available through su");
            self.use_su.store(true, Ordering::Relaxed);
            return true;
        }

        info!("Root access not available");
        false
    }

    async fn copy_file(&self, device_path: &str) -> Result<Vec<u8>, TransportError> {
        let output = self.shell("exec-out", &format!("cat {}", quote_shell_arg(device_path))).await?;

        if let Some(message) = inline_error(&output.stdout) {
            return Err(classify_failure(&message, device_path));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, device_path));
        }
        if output.stdout.is_empty() {
            return Err(TransportError::EmptyResult(format!("{} is empty", device_path)));
        }
        Ok(output.stdout)
    }

    async fn create_backup(&self, package: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let scratch = tempfile::TempDir::new()
            .map_err(|e| TransportError::Protocol(format!("failed to create scratch directory: {}", e)))?;
        let backup_path = scratch.path().join("backup.ab");
        let backup_arg = backup_path.to_string_lossy().into_owned();

        info!("Requesting backup of {}; confirm on the device", package);
        let output = self.run(&["backup", "-f", &backup_arg, "-noapk", package], timeout).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr), package));
        }

        let data = match std::fs::read(&backup_path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransportError::EmptyResult(format!("no backup file was written for {}", package)))
            }
            Err(e) => return Err(TransportError::Protocol(format!("failed to read backup: {}", e))),
        };

        if data.len() <= MIN_BACKUP_SIZE {
            return Err(TransportError::EmptyResult(format!(
                "backup of {} holds {} bytes; the request was probably declined on the device",
                package,
                data.len()
            )));
        }
        debug!("Backup of {} is {} bytes", package, data.len());
        Ok(data)
    }

    async fn query_content_provider(&self, uri: &str) -> Result<Vec<ContentRow>, TransportError> {
        let output = self
            .run(&["shell", "content", "query", "--uri", uri], self.command_timeout)
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() || stdout.contains("Exception") || stdout.starts_with("Error") {
            let message: &str = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(classify_failure(message, uri));
        }
        if stdout.trim() == NO_RESULT {
            return Ok(Vec::new());
        }

        let rows = parse_content_rows(&stdout);
        if rows.is_empty() {
            return Err(TransportError::Protocol(format!(
                "unrecognized content query output for {}",
                uri
            )));
        }
        Ok(rows)
    }

    async fn dump_system_service(&self, service: &str) -> Result<String, TransportError> {
        let output = self.run(&["shell", "dumpsys", service], self.command_timeout).await?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() || text.starts_with("Can't find service") || text.contains("Permission Denial") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message: &str = if text.trim().is_empty() { &stderr } else { &text };
            return Err(classify_failure(message, service));
        }
        if text.trim().is_empty() {
            return Err(TransportError::EmptyResult(format!("dumpsys {} printed nothing", service)));
        }
        Ok(text)
    }
}

/// Find `adb` on PATH, then in the SDK directories named by the environment,
/// then in common install locations
pub fn locate_adb() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(paths) = env::var_os("PATH") {
        candidates.extend(env::split_paths(&paths).map(|dir| dir.join(ADB_BINARY)));
    }
    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(root) = env::var_os(var) {
            candidates.push(PathBuf::from(root).join("platform-tools").join(ADB_BINARY));
        }
    }

    if cfg!(windows) {
        if let Some(local) = env::var_os("LOCALAPPDATA") {
            candidates.push(PathBuf::from(local).join("Android/Sdk/platform-tools").join(ADB_BINARY));
        }
        if let Some(program_files) = env::var_os("ProgramFiles") {
            candidates.push(PathBuf::from(program_files).join("Android/android-sdk/platform-tools").join(ADB_BINARY));
        }
    } else {
        candidates.push(PathBuf::from("/usr/bin/adb"));
        candidates.push(PathBuf::from("/usr/local/bin/adb"));
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(&home).join("Android/Sdk/platform-tools/adb"));
            candidates.push(PathBuf::from(&home).join("Library/Android/sdk/platform-tools/adb"));
        }
    }

    candidates.into_iter().find(|path| path.is_file())
}

/// Serial numbers in `adb devices` output whose state is `device`
fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// `adb devices` ignores `-s`; a pinned transport only sees its own device
fn pinned_devices(devices: Vec<String>, serial: Option<&str>) -> Vec<String> {
    match serial {
        Some(serial) => devices.into_iter().filter(|d| d == serial).collect(),
        None => devices,
    }
}

fn inline_error(stdout: &[u8]) -> Option<String> {
    if stdout.len() > INLINE_ERROR_MAX_LEN {
        return None;
    }
    INLINE_ERROR_PREFIXES
        .iter()
        .any(|prefix| stdout.starts_with(prefix))
        .then(|| String::from_utf8_lossy(stdout).trim().to_string())
}

/// Map tool output onto the transport error taxonomy
fn classify_failure(message: &str, subject: &str) -> TransportError {
    let lower = message.to_lowercase();
    let detail = format!("{}: {}", subject, message.trim());

    const UNREACHABLE: [&str; 5] = ["no devices", "device offline", "unauthorized", "device not found", "device '"];
    const DENIED: [&str; 4] = ["permission denied", "permission denial", "securityexception", "not permitted"];
    const ABSENT: [&str; 4] = ["no such file", "can't find service", "unknown uri", "could not find provider"];

    if UNREACHABLE.iter().any(|p| lower.contains(p)) {
        TransportError::DeviceUnreachable(detail)
    } else if DENIED.iter().any(|p| lower.contains(p)) {
        TransportError::PermissionDenied(detail)
    } else if ABSENT.iter().any(|p| lower.contains(p)) {
        TransportError::EmptyResult(detail)
    } else {
        TransportError::Protocol(detail)
    }
}

/// Single-quote an argument for the device shell
fn quote_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list() {
        let output = "* daemon started successfully\n\
                      List of devices attached\n\
                      R58M12ABCDE\tdevice\n\
                      emulator-5554\toffline\n\
                      0123456789\tunauthorized\n\
                      \n";
        assert_eq!(parse_device_list(output), vec!["R58M12ABCDE".to_string()]);
        assert!(parse_device_list("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_serial_narrows_device_list() {
        let listed = parse_device_list("List of devices attached\nR58M12ABCDE\tdevice\nemulator-5554\tdevice\n");
        assert_eq!(pinned_devices(listed.clone(), None).len(), 2);
        assert_eq!(pinned_devices(listed.clone(), Some("emulator-5554")), vec!["emulator-5554".to_string()]);
        assert!(pinned_devices(listed, Some("0123456789")).is_empty());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("cat: /data/data/x/databases/a.db: Permission denied", "a.db"),
            TransportError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_failure("cat: /data/x: No such file or directory", "x"),
            TransportError::EmptyResult(_)
        ));
        assert!(matches!(
            classify_failure("error: no devices/emulators found", "backup"),
            TransportError::DeviceUnreachable(_)
        ));
        assert!(matches!(
            classify_failure("java.lang.SecurityException: Permission Denial: reading", "content://sms"),
            TransportError::PermissionDenied(_)
        ));
        assert!(matches!(classify_failure("something odd", "x"), TransportError::Protocol(_)));
    }

    #[test]
    fn test_inline_error_detection() {
        assert!(inline_error(b"cat: /data/a.db: Permission denied\n").is_some());
        assert!(inline_error(b"SQLite format 3\0").is_none());
        let mut large = b"cat: ".to_vec();
        large.resize(INLINE_ERROR_MAX_LEN + 1, b'x');
        assert!(inline_error(&large).is_none());
    }

    #[test]
    fn test_quote_shell_arg() {
        assert_eq!(quote_shell_arg("/data/data/a b/c.db"), "'/data/data/a b/c.db'");
        assert_eq!(quote_shell_arg("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let transport = AdbTransport::with_path("/nonexistent/platform-tools/adb", Duration::from_secs(5));
        assert!(!transport.is_tool_available().await);
        assert!(matches!(
            transport.list_connected_devices().await,
            Err(TransportError::ToolUnavailable(_))
        ));
        assert!(matches!(
            transport.copy_file("/data/data/com.android.providers.telephony/databases/mmssms.db").await,
            Err(TransportError::ToolUnavailable(_))
        ));
    }
}
