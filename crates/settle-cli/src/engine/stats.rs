//! Build results of a command run.

use settle::{BuildStats, StatsOptions, StatsPreset};
use std::path::Path;
use std::time::Duration;

/// Outcome of one build command run.
#[derive(Debug, Clone, Default)]
pub struct CommandStats {
    /// The shell line that was run
    pub command: String,
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    /// Files mirrored into memory
    pub emitted: usize,
    /// Files left out of the mirror, with the reason
    pub skipped: Vec<String>,
    /// Why the output could not be mirrored, if it couldn't
    pub mirror_error: Option<String>,
}

impl CommandStats {
    fn summary(&self) -> String {
        let millis = self.duration.as_millis();
        match (self.success, self.exit_code) {
            (true, _) => format!(
                "`{}` finished in {millis} ms, {} files emitted",
                self.command, self.emitted
            ),
            (false, Some(code)) => format!(
                "`{}` exited with code {code} after {millis} ms",
                self.command
            ),
            (false, None) => format!(
                "`{}` was terminated after {millis} ms",
                self.command
            ),
        }
    }

    fn errors(&self) -> Vec<&str> {
        let mut errors: Vec<&str> = Vec::new();
        if !self.success && !self.stderr.trim().is_empty() {
            errors.push(self.stderr.trim_end());
        }
        if let Some(error) = &self.mirror_error {
            errors.push(error.as_str());
        }
        errors
    }

    fn warnings(&self) -> Vec<&str> {
        let mut warnings: Vec<&str> = self.skipped.iter().map(String::as_str).collect();
        if self.success && !self.stderr.trim().is_empty() {
            warnings.push(self.stderr.trim_end());
        }
        warnings
    }
}

impl BuildStats for CommandStats {
    fn has_errors(&self) -> bool {
        !self.success || self.mirror_error.is_some()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings().is_empty()
    }

    fn render(&self, options: &StatsOptions) -> String {
        let mut sections: Vec<String> = Vec::new();
        match options.preset {
            StatsPreset::None => return String::new(),
            StatsPreset::ErrorsOnly => {
                sections.extend(self.errors().into_iter().map(str::to_string));
            }
            StatsPreset::Minimal | StatsPreset::Normal => {
                sections.push(self.summary());
                sections.extend(self.errors().into_iter().map(str::to_string));
                sections.extend(self.warnings().into_iter().map(str::to_string));
            }
            StatsPreset::Verbose => {
                sections.push(self.summary());
                if !self.stdout.trim().is_empty() {
                    sections.push(self.stdout.trim_end().to_string());
                }
                sections.extend(self.errors().into_iter().map(str::to_string));
                sections.extend(self.warnings().into_iter().map(str::to_string));
            }
        }

        let text = sections.join("\n");
        match &options.context {
            Some(context) => relativize(&text, context),
            None => text,
        }
    }
}

/// Show paths under `context` relative to it.
fn relativize(text: &str, context: &Path) -> String {
    let context = context.to_string_lossy();
    if context.is_empty() || context == "/" {
        return text.to_string();
    }
    text.replace(context.as_ref(), ".")
}
