//! Watchdog handoff: a detached script that installs the update after we exit.
//!
//! A running executable cannot replace itself, so the installer is run by a
//! small generated script that first waits for this process to disappear.
//! Everything it needs (pid, installer, target executable) is baked into the
//! script text when it is generated.

use super::UpdateError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use std::process::{Command, Stdio};

/// Prefix of generated watchdog scripts in the temp directory.
pub const SCRIPT_PREFIX: &str = "pdfmaker_update_";

/// `CREATE_NO_WINDOW`: cmd gets a hidden console of its own.
///
/// Never combined with `DETACHED_PROCESS`, the two conflict.
#[cfg_attr(not(windows), allow(dead_code))]
const WATCHDOG_CREATION_FLAGS: u32 = 0x0800_0000;

/// What the watchdog script does once this process has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogPlan {
    pub pid: u32,
    pub installer: Utf8PathBuf,
    pub target_exe: Utf8PathBuf,
}

impl WatchdogPlan {
    /// Script for the current platform.
    pub fn render(&self) -> String {
        if cfg!(windows) {
            self.render_windows()
        } else {
            self.render_posix()
        }
    }

    /// File extension the script needs to be runnable on this platform.
    pub fn script_suffix() -> &'static str {
        if cfg!(windows) { ".bat" } else { ".sh" }
    }

    /// Batch file: poll `tasklist`, run the installer silently, relaunch.
    pub fn render_windows(&self) -> String {
        [
            "@echo off".to_string(),
            "setlocal enabledelayedexpansion".to_string(),
            format!("set TARGET=\"{}\"", self.target_exe),
            format!("set INSTALLER=\"{}\"", self.installer),
            format!("set PID={}", self.pid),
            ":waitloop".to_string(),
            "tasklist /FI \"PID eq %PID%\" | find \"%PID%\" >nul".to_string(),
            "if %errorlevel%==0 (".to_string(),
            "  timeout /t 1 /nobreak >nul".to_string(),
            "  goto waitloop".to_string(),
            ")".to_string(),
            "start /wait \"\" %INSTALLER% /VERYSILENT /SUPPRESSMSGBOXES /NORESTART /CURRENTUSER"
                .to_string(),
            "del /f /q %INSTALLER%".to_string(),
            "start \"\" %TARGET%".to_string(),
            "del /f /q \"%~f0\"".to_string(),
            String::new(),
        ]
        .join("\r\n")
    }

    /// POSIX `sh` script: poll with `kill -0`, run the installer, relaunch.
    pub fn render_posix(&self) -> String {
        format!(
            r#"#!/bin/sh
# pdfmaker update watchdog
PID={pid}
INSTALLER={installer}
TARGET={target}

while kill -0 "$PID" 2>/dev/null; do
    sleep 1
done

chmod +x "$INSTALLER"
"$INSTALLER" --silent --no-restart --current-user
rm -f "$INSTALLER"
"$TARGET" >/dev/null 2>&1 &
rm -f "$0"
"#,
            pid = self.pid,
            installer = sh_quote(self.installer.as_str()),
            target = sh_quote(self.target_exe.as_str()),
        )
    }
}

/// Single-quote `value` for `sh`.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The process operations the handoff needs.
pub trait ProcessControl: Send + Sync {
    fn current_pid(&self) -> u32;

    fn current_exe(&self) -> io::Result<Utf8PathBuf>;

    /// Start `script` with no console, no inherited stdio and no parent link,
    /// so it keeps running after this process exits.
    fn spawn_detached(&self, script: &Utf8Path) -> io::Result<()>;
}

/// [`ProcessControl`] for the real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn current_exe(&self) -> io::Result<Utf8PathBuf> {
        let exe = std::env::current_exe()?;
        Utf8PathBuf::from_path_buf(exe).map_err(|p| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("executable path is not valid UTF-8: {}", p.display()),
            )
        })
    }

    #[cfg(windows)]
    fn spawn_detached(&self, script: &Utf8Path) -> io::Result<()> {
        use std::os::windows::process::CommandExt;

        Command::new("cmd")
            .arg("/c")
            .arg(script.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(WATCHDOG_CREATION_FLAGS)
            .spawn()?;
        Ok(())
    }

    #[cfg(unix)]
    fn spawn_detached(&self, script: &Utf8Path) -> io::Result<()> {
        use std::os::unix::process::CommandExt;

        Command::new("sh")
            .arg(script.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        Ok(())
    }
}

/// Write the watchdog script for `installer` and launch it detached.
///
/// Returns the script path. On failure nothing is launched, the script file
/// is removed, and the caller keeps running.
pub fn hand_off(
    installer: &Utf8Path,
    process: &dyn ProcessControl,
) -> Result<Utf8PathBuf, UpdateError> {
    let apply = |e: io::Error| UpdateError::Apply(e.to_string());

    let plan = WatchdogPlan {
        pid: process.current_pid(),
        installer: installer.to_path_buf(),
        target_exe: process.current_exe().map_err(apply)?,
    };

    let script = write_script(&plan).map_err(apply)?;
    tracing::info!(
        "Launching update watchdog {} for pid {} (target {})",
        script,
        plan.pid,
        plan.target_exe
    );

    if let Err(e) = process.spawn_detached(&script) {
        if let Err(remove_err) = fs::remove_file(&script) {
            tracing::debug!("Could not remove watchdog script {}: {}", script, remove_err);
        }
        return Err(apply(e));
    }

    Ok(script)
}

fn write_script(plan: &WatchdogPlan) -> io::Result<Utf8PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .suffix(WatchdogPlan::script_suffix())
        .tempfile()?;
    file.write_all(plan.render().as_bytes())?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|e| e.error)?;
    let path = Utf8PathBuf::from_path_buf(path).map_err(|p| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("script path is not valid UTF-8: {}", p.display()),
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> WatchdogPlan {
        WatchdogPlan {
            pid: 4242,
            installer: Utf8PathBuf::from("/tmp/pdfmaker_update_abc.run"),
            target_exe: Utf8PathBuf::from("/opt/pdf maker/pdfmaker"),
        }
    }

    #[test]
    fn test_windows_spawn_uses_single_console_flag() {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        assert_eq!(WATCHDOG_CREATION_FLAGS, 0x0800_0000);
        assert_eq!(WATCHDOG_CREATION_FLAGS & DETACHED_PROCESS, 0);
    }

    #[test]
    fn test_windows_script_steps_in_order() {
        let script = plan().render_windows();

        let wait = script.find("tasklist /FI \"PID eq %PID%\"").unwrap();
        let install = script.find("/VERYSILENT /SUPPRESSMSGBOXES /NORESTART /CURRENTUSER").unwrap();
        let delete_installer = script.find("del /f /q %INSTALLER%").unwrap();
        let relaunch = script.find("start \"\" %TARGET%").unwrap();
        let self_delete = script.find("del /f /q \"%~f0\"").unwrap();

        assert!(wait < install && install < delete_installer);
        assert!(delete_installer < relaunch && relaunch < self_delete);
        assert!(script.contains("set PID=4242\r\n"));
        assert!(script.contains("set TARGET=\"/opt/pdf maker/pdfmaker\""));
    }

    #[test]
    fn test_posix_script_quotes_paths() {
        let script = plan().render_posix();

        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("PID=4242\n"));
        assert!(script.contains("TARGET='/opt/pdf maker/pdfmaker'\n"));
        assert!(script.contains("while kill -0 \"$PID\""));
        assert!(script.contains("--silent --no-restart --current-user"));
        assert!(script.trim_end().ends_with("rm -f \"$0\""));
    }

    #[test]
    fn test_sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }
}
