//! Gridding tool execution

use pointstore_common::types::BBox;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use super::package::{grid_outputs, package_grid};
use super::{
    GridError, GridInputs, GridParams, GridTask, GridWorkspace, SuccessCheck, SUCCESS_MARKER,
};

/// Runs grid tasks with an external gridding program
#[derive(Debug, Clone)]
pub struct GridExecutor {
    program: String,
    timeout: Duration,
    success_check: SuccessCheck,
}

/// Packaged grid, valid while the workspace lives
#[derive(Debug)]
pub struct GridOutput {
    pub archive: PathBuf,
    pub stdout: String,
    workspace: GridWorkspace,
}

impl GridOutput {
    pub fn workspace(&self) -> &GridWorkspace {
        &self.workspace
    }
}

impl GridExecutor {
    pub fn new(program: impl Into<String>, timeout: Duration, success_check: SuccessCheck) -> Self {
        Self {
            program: program.into(),
            timeout,
            success_check,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the datalist, run the tool, verify and package the result
    ///
    /// The workspace moves into the returned [`GridOutput`]; on error it is
    /// dropped here and its files are removed.
    #[instrument(skip(self, workspace, inputs, bbox, params), fields(program = %self.program))]
    pub async fn execute(
        &self,
        workspace: GridWorkspace,
        order_id: &str,
        inputs: GridInputs,
        bbox: BBox,
        params: GridParams,
    ) -> Result<GridOutput, GridError> {
        let mut task = GridTask::new(order_id, inputs, bbox, params)?;
        match self.run(&mut task, workspace.path()).await {
            Ok(stdout) => {
                let dir = workspace.path().to_path_buf();
                let order = order_id.to_string();
                let attachments = task.inputs().attachments.clone();
                let archive = tokio::task::spawn_blocking(move || {
                    package_grid(&dir, &order, &attachments)
                })
                .await
                .map_err(|e| GridError::Io(std::io::Error::other(e)))??;
                info!(archive = %archive.display(), "Grid packaged");
                Ok(GridOutput {
                    archive,
                    stdout,
                    workspace,
                })
            },
            Err(e) => {
                task.fail();
                error!(error = %e, "Grid task failed");
                Err(e)
            },
        }
    }

    async fn run(&self, task: &mut GridTask, dir: &Path) -> Result<String, GridError> {
        task.build_datalist(dir).await?;
        let args = task.command_args()?;
        debug!(?args, "Starting grid tool");

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GridError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GridError::Timeout(self.timeout))??;
        task.mark_executed()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut problems = Vec::new();
        if !output.status.success() {
            problems.push(format!("exited with {}", output.status));
        }
        if !stdout.contains(SUCCESS_MARKER) {
            problems.push("success marker missing from output".to_string());
        }
        if grid_outputs(dir, task.order_id()).is_empty() {
            problems.push("no grid file written".to_string());
        }

        if !problems.is_empty() {
            let reason = problems.join("; ");
            match self.success_check {
                SuccessCheck::Strict => return Err(GridError::ToolFailed { reason, stderr }),
                SuccessCheck::Lenient => {
                    warn!(reason = %reason, stderr = %stderr.trim(), "Grid tool reported problems");
                },
            }
        }

        task.mark_verified()?;
        Ok(stdout)
    }
}
