// ===============================
// src/engine.rs (engine process driver)
// ===============================
//
// Satu request = satu proses engine:
// - script ditulis ke file sementara (NamedTempFile, selalu dihapus saat drop)
// - path script jadi argumen posisi terakhir
// - stdout ditangkap penuh, dibatasi timeout; kalau lewat, proses di-kill
//
use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::ReplayError;
use crate::metrics::{ENGINE_LATENCY, ENGINE_RUNS};

#[derive(Debug, Clone)]
pub struct EngineCfg {
    pub program: PathBuf,
    /// Passed before the script path (e.g. `["-c", "..."]` for a shell wrapper).
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Where scripts are staged; OS temp dir when `None`.
    pub script_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineDriver {
    cfg: EngineCfg,
}

impl EngineDriver {
    pub fn new(cfg: EngineCfg) -> Self { Self { cfg } }

    fn stage(&self, script: &str) -> Result<NamedTempFile, ReplayError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("engine-script-").suffix(".txt");
        let mut file = match &self.cfg.script_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(ReplayError::ResourceStaging)?;
        file.write_all(script.as_bytes()).map_err(ReplayError::ResourceStaging)?;
        file.flush().map_err(ReplayError::ResourceStaging)?;
        Ok(file)
    }

    /// Run the engine once over `script`. Blocking from the caller's view; no retries.
    pub async fn run(&self, script: &str) -> Result<EngineOutput, ReplayError> {
        let staged = self.stage(script)?;
        let started = Instant::now();
        let result = self.invoke(staged.path().to_path_buf()).await;

        // file is gone after this line whatever `result` is
        let cleanup = staged.close().map_err(ReplayError::ResourceStaging);

        let elapsed = started.elapsed();
        ENGINE_LATENCY.observe(elapsed.as_secs_f64() * 1_000.0);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        ENGINE_RUNS.with_label_values(&[outcome]).inc();

        let (stdout, stderr, status) = result?;
        cleanup?;
        debug!(bytes = stdout.len(), ?elapsed, "engine finished");
        Ok(EngineOutput { stdout, stderr, status, elapsed })
    }

    async fn invoke(&self, script_path: PathBuf) -> Result<(String, String, ExitStatus), ReplayError> {
        let program = &self.cfg.program;
        let child = Command::new(program)
            .args(&self.cfg.args)
            .arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(?e, program = %program.display(), "engine spawn failed");
                ReplayError::EngineInvocation(format!("spawn {}: {e}", program.display()))
            })?;

        // On expiry the wait future is dropped together with the child -> SIGKILL.
        let output = match timeout(self.cfg.timeout, child.wait_with_output()).await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => {
                error!(?e, "engine wait failed");
                return Err(ReplayError::EngineInvocation(format!("wait: {e}")));
            }
            Err(_) => {
                warn!(timeout = ?self.cfg.timeout, "engine timed out, killed");
                return Err(ReplayError::EngineTimeout(self.cfg.timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            error!(status = %output.status, %stderr, "engine exited with failure");
            let first = stderr.lines().next().unwrap_or("").trim();
            return Err(ReplayError::EngineInvocation(format!("engine exited with {}: {first}", output.status)));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| ReplayError::MalformedReport("engine stdout is not valid UTF-8".into()))?;
        Ok((stdout, stderr, output.status))
    }
}
