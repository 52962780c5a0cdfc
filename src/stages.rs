//! Downstream stages run as external processes.
//!
//! Map rendering and time-series plotting are separate programs. The
//! orchestrator only needs to start them with the right arguments and learn
//! whether they exited cleanly.

use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::error::{IndicatorError, Result};

/// A downstream stage the orchestrator may trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Indicator time-series plot, after a successful indicator update
    Plot,
    /// Monthly SST maps, when the rendered maps lag the remote data
    Maps,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Plot => write!(f, "plot"),
            Stage::Maps => write!(f, "maps"),
        }
    }
}

/// Result of a stage, as reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Failed(String),
    Skipped(String),
}

impl StageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// Something that can execute a stage
pub trait StageRunner {
    /// Whether a command is configured for `stage`
    fn is_configured(&self, stage: Stage) -> bool;

    /// Run `stage` with extra arguments; `Err` for a non-zero exit or a spawn failure
    fn run(&self, stage: Stage, args: &[String]) -> Result<()>;
}

/// Runs stages as child processes from configured argv vectors
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    commands: HashMap<Stage, Vec<String>>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the command for a stage; empty argv vectors are ignored
    pub fn with_command(mut self, stage: Stage, argv: Option<Vec<String>>) -> Self {
        if let Some(argv) = argv.filter(|a| !a.is_empty()) {
            self.commands.insert(stage, argv);
        }
        self
    }
}

impl StageRunner for CommandRunner {
    fn is_configured(&self, stage: Stage) -> bool {
        self.commands.contains_key(&stage)
    }

    fn run(&self, stage: Stage, args: &[String]) -> Result<()> {
        let argv = self.commands.get(&stage).ok_or_else(|| IndicatorError::Stage {
            stage: stage.to_string(),
            message: "no command configured".to_string(),
        })?;

        info!(stage = %stage, command = %argv.join(" "), args = %args.join(" "), "Executing stage");

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .args(args)
            .output()
            .map_err(|e| IndicatorError::Stage {
                stage: stage.to_string(),
                message: format!("failed to start {}: {}", argv[0], e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(stage = %stage, stdout = %stdout.trim_end(), "Stage stdout");

        if output.status.success() {
            if !stderr.trim().is_empty() {
                debug!(stage = %stage, stderr = %stderr.trim_end(), "Stage stderr");
            }
            info!(stage = %stage, "Stage completed");
            Ok(())
        } else {
            warn!(stage = %stage, status = %output.status, stderr = %stderr.trim_end(), "Stage failed");
            Err(IndicatorError::Stage {
                stage: stage.to_string(),
                message: format!("{}", output.status),
            })
        }
    }
}
