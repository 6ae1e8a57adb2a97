use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::RunConfig;

pub const CONFIG_FILE_NAME: &str = "playlist-digest.toml";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DigestConfig {
    pub run: RunSection,
    pub summarizer: SummarizerConfig,
    pub tools: ToolsConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RunSection {
    pub locale: String,
    pub screenshots: bool,
    pub concurrency: u32,
    pub state_dir: String,
    pub output_dir: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Program that prints the summary JSON on stdout.
    pub command: String,
    /// Arguments; `{url}` and `{locale}` are substituted per item.
    pub args: Vec<String>,
    pub timeout_minutes: u32,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp: String,
    pub ffmpeg: String,
    pub capture_timeout_seconds: u32,
    pub catalog_timeout_seconds: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            screenshots: true,
            concurrency: 1,
            state_dir: ".playlist-digest".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            command: "summarize-video".to_string(),
            args: vec![
                "--url".to_string(),
                "{url}".to_string(),
                "--locale".to_string(),
                "{locale}".to_string(),
            ],
            timeout_minutes: 10,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            capture_timeout_seconds: 120,
            catalog_timeout_seconds: 120,
        }
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes) * 60)
    }

    /// Arguments with placeholders filled in for one item.
    pub fn render_args(&self, url: &str, locale: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{url}", url).replace("{locale}", locale))
            .collect()
    }
}

impl ToolsConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.capture_timeout_seconds))
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.catalog_timeout_seconds))
    }
}

impl DigestConfig {
    /// Run configuration for a brand-new state document.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            locale: self.run.locale.clone(),
            screenshots: self.run.screenshots,
        }
    }

    pub fn state_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.run.state_dir)
    }

    pub fn output_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.run.output_dir)
    }
}

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub concurrency: Option<u32>,
    pub locale: Option<String>,
    pub no_screenshots: bool,
}

pub fn apply_overrides(config: &mut DigestConfig, overrides: &RunOverrides) {
    if let Some(c) = overrides.concurrency {
        config.run.concurrency = c;
    }
    if let Some(ref locale) = overrides.locale {
        config.run.locale = locale.clone();
    }
    if overrides.no_screenshots {
        config.run.screenshots = false;
    }
}

pub fn validate(config: &DigestConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.run.concurrency < 1 {
        errors.push("run.concurrency must be >= 1".to_string());
    }

    if config.run.locale.trim().is_empty() {
        errors.push("run.locale must not be empty".to_string());
    }

    if config.run.state_dir.trim().is_empty() {
        errors.push("run.state_dir must not be empty".to_string());
    }

    if config.summarizer.command.trim().is_empty() {
        errors.push("summarizer.command must not be empty".to_string());
    }

    if !config.summarizer.args.iter().any(|a| a.contains("{url}")) {
        errors.push("summarizer.args must reference {url}".to_string());
    }

    if config.summarizer.timeout_minutes == 0 {
        errors.push("summarizer.timeout_minutes must be >= 1".to_string());
    }

    if config.tools.capture_timeout_seconds == 0 {
        errors.push("tools.capture_timeout_seconds must be >= 1".to_string());
    }

    if config.tools.catalog_timeout_seconds == 0 {
        errors.push("tools.catalog_timeout_seconds must be >= 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn format_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Load `playlist-digest.toml` from the project root.
pub fn load_config(project_root: &Path) -> Result<DigestConfig, String> {
    load_config_from(None, project_root)
}

/// Load config from an explicit path, or `{project_root}/playlist-digest.toml`.
///
/// A missing default file means all defaults. A missing explicit file is an
/// error.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<DigestConfig, String> {
    let path = match config_path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()));
            }
            p.to_path_buf()
        }
        None => {
            let default_path = project_root.join(CONFIG_FILE_NAME);
            if !default_path.exists() {
                return Ok(DigestConfig::default());
            }
            default_path
        }
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let config: DigestConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    validate(&config)
        .map_err(|errors| format!("Config validation failed:\n{}", format_errors(&errors)))?;

    Ok(config)
}

/// Commented default config written by `init`.
pub fn default_config_toml() -> String {
    r#"[run]
locale = "en"
screenshots = true
concurrency = 1
# state_dir = ".playlist-digest"
# output_dir = "output"

[summarizer]
# Any program that prints {"overview", "sections": [{"timestamp", ...}], "keyPoints"} as JSON
command = "summarize-video"
args = ["--url", "{url}", "--locale", "{locale}"]
timeout_minutes = 10

[tools]
# ytdlp = "yt-dlp"
# ffmpeg = "ffmpeg"
# capture_timeout_seconds = 120
# catalog_timeout_seconds = 120
"#
    .to_string()
}
