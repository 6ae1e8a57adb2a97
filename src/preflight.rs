use crate::collaborators::find_on_path;
use crate::config::{self, DigestConfig, CONFIG_FILE_NAME};

/// A single preflight validation error with actionable context.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightError {
    /// What condition failed.
    pub condition: String,
    /// Where in the config the error originates.
    pub config_location: String,
    /// How to fix it.
    pub suggested_fix: String,
}

impl std::fmt::Display for PreflightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Preflight error: {}\n  Config: {}\n  Fix: {}",
            self.condition, self.config_location, self.suggested_fix
        )
    }
}

/// Run all checks that must pass before any item is touched.
///
/// Phases:
/// 1. Structural validation of the effective config, after CLI overrides
///    (no I/O)
/// 2. Tool probe: every external program the run will spawn is on PATH.
///    `ffmpeg` is only required when screenshots are enabled.
///
/// Returns every failure at once.
pub fn run_preflight(config: &DigestConfig) -> Result<(), Vec<PreflightError>> {
    let mut errors = validate_structure(config);
    errors.extend(probe_tools(config));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn format_preflight_errors(errors: &[PreflightError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Phase 1: Structural validation ---

fn location(key: &str) -> String {
    format!("{} → {}", CONFIG_FILE_NAME, key)
}

fn validate_structure(config: &DigestConfig) -> Vec<PreflightError> {
    let Err(problems) = config::validate(config) else {
        return Vec::new();
    };

    problems
        .into_iter()
        .map(|problem| {
            let key = problem
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            PreflightError {
                suggested_fix: format!(
                    "Fix {} in {} or override it on the command line",
                    key, CONFIG_FILE_NAME
                ),
                config_location: location(&key),
                condition: problem,
            }
        })
        .collect()
}

// --- Phase 2: Tool probe ---

fn probe_tools(config: &DigestConfig) -> Vec<PreflightError> {
    let mut required = vec![
        ("tools.ytdlp", config.tools.ytdlp.as_str()),
        ("summarizer.command", config.summarizer.command.as_str()),
    ];
    if config.run.screenshots {
        required.push(("tools.ffmpeg", config.tools.ffmpeg.as_str()));
    }

    required
        .into_iter()
        .filter(|(_, binary)| !binary.trim().is_empty())
        .filter(|(_, binary)| find_on_path(binary).is_none())
        .map(|(key, binary)| PreflightError {
            condition: format!("{} not found on PATH", binary),
            config_location: location(key),
            suggested_fix: format!("Install {} or set {} to its full path", binary, key),
        })
        .collect()
}
