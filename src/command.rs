//! User-configured command run after an event
//!
//! The command is launched and left running. Its exit status is only logged.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::config::CommandConfig;
use crate::errors::{NotifierError, Result};
use crate::event::EventType;

/// Starts an external program without waiting for it
pub trait CommandLauncher: Send + Sync {
    fn launch(&self, program: &str, args: &[String]) -> Result<()>;
}

/// Spawns a detached child process; must be called inside a tokio runtime
pub struct ProcessLauncher;

impl CommandLauncher for ProcessLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<()> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let program = program.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(program = %program, "Command finished");
                }
                Ok(status) => {
                    let e = NotifierError::command_failed(&program, status);
                    tracing::debug!(error = %e, "Command failed");
                }
                Err(e) => {
                    tracing::debug!(program = %program, error = %e, "Command wait failed");
                }
            }
        });
        Ok(())
    }
}

/// Replace `{event}` and `{message}` tokens in each argument
pub fn substitute_args(args: &[String], event: EventType, message: &str) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{event}", event.as_str())
                .replace("{message}", message)
        })
        .collect()
}

/// Gate on time since the last user message; unknown elapsed time never skips
pub fn below_min_duration(min_duration: f64, elapsed_secs: Option<f64>) -> bool {
    min_duration > 0.0 && elapsed_secs.is_some_and(|elapsed| elapsed < min_duration)
}

pub struct CommandRunner {
    launcher: Arc<dyn CommandLauncher>,
}

impl CommandRunner {
    pub fn new(launcher: Arc<dyn CommandLauncher>) -> Self {
        Self { launcher }
    }

    /// Launch the configured command for `event`; returns whether it was started
    pub fn run(
        &self,
        config: &CommandConfig,
        event: EventType,
        message: &str,
        elapsed_secs: Option<f64>,
    ) -> bool {
        if !config.enabled || config.path.is_empty() {
            return false;
        }

        if below_min_duration(config.min_duration, elapsed_secs) {
            tracing::debug!(
                event = %event,
                elapsed = ?elapsed_secs,
                min_duration = config.min_duration,
                "Command skipped: session too short"
            );
            return false;
        }

        let args = config
            .args
            .as_deref()
            .map(|args| substitute_args(args, event, message))
            .unwrap_or_default();

        match self.launcher.launch(&config.path, &args) {
            Ok(()) => {
                tracing::info!(event = %event, command = %config.path, "Command launched");
                true
            }
            Err(e) => {
                tracing::warn!(event = %event, command = %config.path, error = %e, "Command launch failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CommandLauncher for RecordingLauncher {
        fn launch(&self, program: &str, args: &[String]) -> Result<()> {
            self.launched
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok(())
        }
    }

    fn command(min_duration: f64) -> CommandConfig {
        CommandConfig {
            enabled: true,
            path: "/usr/local/bin/hook".to_string(),
            args: Some(vec!["--event".into(), "{event}".into(), "{message}!".into()]),
            min_duration,
        }
    }

    #[test]
    fn test_min_duration_gate() {
        assert!(below_min_duration(30.0, Some(10.0)));
        assert!(!below_min_duration(30.0, Some(31.0)));
        assert!(!below_min_duration(30.0, None));
        assert!(!below_min_duration(0.0, Some(1.0)));
    }

    #[test]
    fn test_run_respects_min_duration() {
        let launcher = Arc::new(RecordingLauncher::default());
        let runner = CommandRunner::new(launcher.clone());

        assert!(!runner.run(&command(30.0), EventType::Complete, "done", Some(10.0)));
        assert!(launcher.launched.lock().unwrap().is_empty());

        assert!(runner.run(&command(30.0), EventType::Complete, "done", Some(31.0)));
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_run_substitutes_tokens() {
        let launcher = Arc::new(RecordingLauncher::default());
        let runner = CommandRunner::new(launcher.clone());

        runner.run(&command(0.0), EventType::SubagentComplete, "All set", None);

        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched[0].0, "/usr/local/bin/hook");
        assert_eq!(launched[0].1, ["--event", "subagent_complete", "All set!"]);
    }

    #[test]
    fn test_disabled_or_empty_path() {
        let launcher = Arc::new(RecordingLauncher::default());
        let runner = CommandRunner::new(launcher.clone());

        let mut disabled = command(0.0);
        disabled.enabled = false;
        assert!(!runner.run(&disabled, EventType::Error, "x", None));

        let mut no_path = command(0.0);
        no_path.path.clear();
        assert!(!runner.run(&no_path, EventType::Error, "x", None));

        assert!(launcher.launched.lock().unwrap().is_empty());
    }
}
