//! Post-summary hooks
//!
//! After a scheduled or manual flush writes a snapshot file, the engine hands
//! its path to a [`SummaryHook`]. The usual hook runs an external reporting
//! program with the path as its last argument.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

#[async_trait]
pub trait SummaryHook: Send + Sync {
    async fn on_summary(&self, path: &Path);
}

/// Runs `program args... <snapshot path>` and waits for it to exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full argv; `None` when it is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// Run the command, returning whether it exited successfully
    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn run(&self, path: &Path) -> bool {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                info!("summary hook finished for {}", path.display());
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.trim().is_empty() {
                    debug!("hook output: {}", stdout.trim());
                }
                true
            }
            Ok(output) => {
                warn!(
                    "summary hook exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                error!("failed to run summary hook: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl SummaryHook for CommandHook {
    async fn on_summary(&self, path: &Path) {
        self.run(path).await;
    }
}
