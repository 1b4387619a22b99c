//! Built-in operations
//!
//! - `sleep`: async sleep, returns `{"slept": seconds}`
//! - `http_get`: fetch a URL, returns `{"status", "len"}` (needs the `http` feature)
//! - `compute_kpis`, `build_dashboard`, `dispatch_alerts`: run a Python tool
//!   under `<data_dir>/tools/` and capture its output (`dispatch_alerts`
//!   runs `alert_dispatch.py`)

use crate::error::OperationError;
use crate::registry::{Operation, OperationRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// How script-backed operations launch their interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    /// Interpreter executable
    pub python: PathBuf,
    /// Budget for one script run when the job does not give `timeout_secs`
    pub default_timeout: Duration,
    /// Working directory for relative `data_dir` values (process cwd if unset)
    pub working_dir: Option<PathBuf>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            default_timeout: Duration::from_secs(600),
            working_dir: None,
        }
    }
}

/// Captured result of a script run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Exit code; `-N` when killed by signal `N`
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Register every built-in operation
pub fn register_builtins(registry: &OperationRegistry, settings: ScriptSettings) {
    let settings = Arc::new(settings);

    registry.register("sleep", Operation::typed(sleep));
    registry.register("http_get", Operation::typed(http_get));

    let s = Arc::clone(&settings);
    registry.register(
        "compute_kpis",
        Operation::typed(move |args: ComputeKpisArgs| {
            let settings = Arc::clone(&s);
            async move { args.run(&settings).await }
        }),
    );
    let s = Arc::clone(&settings);
    registry.register(
        "build_dashboard",
        Operation::typed(move |args: BuildDashboardArgs| {
            let settings = Arc::clone(&s);
            async move { args.run(&settings).await }
        }),
    );
    registry.register(
        "dispatch_alerts",
        Operation::typed(move |args: DispatchAlertsArgs| {
            let settings = Arc::clone(&settings);
            async move { args.run(&settings).await }
        }),
    );
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SleepArgs {
    #[serde(default = "default_sleep_secs")]
    seconds: u64,
}

fn default_sleep_secs() -> u64 {
    1
}

async fn sleep(args: SleepArgs) -> Result<Value, OperationError> {
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    Ok(json!({ "slept": args.seconds }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpGetArgs {
    url: String,
    #[serde(default = "default_http_timeout")]
    timeout: u64,
}

fn default_http_timeout() -> u64 {
    10
}

#[cfg(feature = "http")]
async fn http_get(args: HttpGetArgs) -> Result<Value, OperationError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
        .map_err(|e| OperationError::failed(format!("http client: {e}")))?;
    let response = client
        .get(&args.url)
        .send()
        .await
        .map_err(|e| OperationError::failed(format!("GET {}: {e}", args.url)))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| OperationError::failed(format!("GET {}: {e}", args.url)))?;
    Ok(json!({ "status": status, "len": body.len() }))
}

#[cfg(not(feature = "http"))]
async fn http_get(args: HttpGetArgs) -> Result<Value, OperationError> {
    let _ = (args.url, args.timeout);
    Ok(json!({ "error": "dependency unavailable: built without the `http` feature" }))
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_true() -> bool {
    true
}

fn default_days() -> u32 {
    7
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComputeKpisArgs {
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_true")]
    write: bool,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl ComputeKpisArgs {
    async fn run(self, settings: &ScriptSettings) -> Result<ScriptOutput, OperationError> {
        let mut flags = Vec::new();
        if self.write {
            flags.push("--write".to_string());
        }
        push_verbose(&mut flags, self.verbose);
        run_script(settings, "compute_kpis.py", &self.data_dir, &flags, self.timeout_secs).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildDashboardArgs {
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_days")]
    days: u32,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl BuildDashboardArgs {
    async fn run(self, settings: &ScriptSettings) -> Result<ScriptOutput, OperationError> {
        let mut flags = vec!["--days".to_string(), self.days.to_string()];
        push_verbose(&mut flags, self.verbose);
        run_script(settings, "build_dashboard.py", &self.data_dir, &flags, self.timeout_secs).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatchAlertsArgs {
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default)]
    flush: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl DispatchAlertsArgs {
    async fn run(self, settings: &ScriptSettings) -> Result<ScriptOutput, OperationError> {
        let mut flags = Vec::new();
        if self.flush {
            flags.push("--flush".to_string());
        }
        if self.dry_run {
            flags.push("--dry-run".to_string());
        }
        push_verbose(&mut flags, self.verbose);
        run_script(settings, "alert_dispatch.py", &self.data_dir, &flags, self.timeout_secs).await
    }
}

fn push_verbose(flags: &mut Vec<String>, verbose: bool) {
    if verbose {
        flags.push("--verbose".to_string());
    }
}

/// `<data_dir>/tools/<script>`
fn script_path(data_dir: &str, script: &str) -> PathBuf {
    Path::new(data_dir).join("tools").join(script)
}

/// Run `<python> <data_dir>/tools/<script> --data-dir <data_dir> [flags]`
///
/// A non-zero exit is not a job failure: the code is reported in
/// `returncode`. Exceeding the time budget kills the child and fails the job.
async fn run_script(
    settings: &ScriptSettings,
    script: &str,
    data_dir: &str,
    flags: &[String],
    timeout_secs: Option<u64>,
) -> Result<ScriptOutput, OperationError> {
    let path = script_path(data_dir, script);
    let mut command = Command::new(&settings.python);
    command
        .arg(&path)
        .arg("--data-dir")
        .arg(data_dir)
        .args(flags)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &settings.working_dir {
        command.current_dir(dir);
    }

    let budget = timeout_secs.map_or(settings.default_timeout, Duration::from_secs);
    tracing::debug!("Running {} {}", settings.python.display(), path.display());

    let output = match tokio::time::timeout(budget, command.output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(OperationError::Timeout {
                timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            })
        }
    };

    Ok(ScriptOutput {
        returncode: exit_code(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
