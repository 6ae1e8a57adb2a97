use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{SummarizerConfig, ToolsConfig};
use crate::types::{SourceItem, Summary};
use crate::{log_debug, log_warn};

/// Lines of stderr kept when a subprocess fails.
const STDERR_TAIL_LINES: usize = 5;

/// Canonical watch URL for a video id.
pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", playlist_id)
}

/// Accept a bare playlist id or any URL carrying a `list=` parameter.
pub fn parse_playlist_id(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    let candidate = match trimmed.find("list=") {
        Some(pos) => {
            let rest = &trimmed[pos + "list=".len()..];
            rest.split(['&', '#']).next().unwrap_or("")
        }
        None if trimmed.contains("://") => {
            return Err(format!("URL '{}' has no list= parameter", input));
        }
        None => trimmed,
    };

    if candidate.is_empty()
        || !candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("Invalid playlist id '{}'", candidate));
    }

    Ok(candidate.to_string())
}

// --- Collaborator contracts ---

/// A playlist as reported by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPlaylist {
    pub id: String,
    pub title: String,
    pub items: Vec<SourceItem>,
}

/// Fetches playlist metadata. Invoked by the caller before reconciliation.
pub trait CatalogFetcher: Send + Sync {
    fn fetch_playlist(
        &self,
        playlist_id: &str,
    ) -> impl std::future::Future<Output = Result<CatalogPlaylist, String>> + Send;
}

/// Produces a structured summary for one video.
pub trait Summarizer: Send + Sync {
    fn summarize(
        &self,
        video_id: &str,
        locale: &str,
    ) -> impl std::future::Future<Output = Result<Summary, String>> + Send;
}

/// Writes one still frame of a video at `timestamp` to `output_path`.
pub trait FrameCapturer: Send + Sync {
    fn capture(
        &self,
        video_id: &str,
        timestamp: &str,
        output_path: &Path,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

// --- Subprocess plumbing ---

/// Run a configured command to completion and return its stdout.
///
/// stdin is null, stdout/stderr are captured, and the child is killed if the
/// timeout elapses (the future drops the child, and `kill_on_drop` reaps it).
pub async fn run_command(
    mut cmd: tokio::process::Command,
    timeout: Duration,
) -> Result<String, String> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    log_debug!("[cmd] Spawning {}...", program);
    let child = cmd
        .spawn()
        .map_err(|e| format!("Failed to spawn {}: {}", program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => {
            return Err(format!(
                "{} timed out after {} seconds",
                program,
                timeout.as_secs()
            ))
        }
        Ok(result) => result.map_err(|e| format!("Error waiting for {}: {}", program, e))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ");
        return Err(format!(
            "{} failed (exit code {:?}): {}",
            program,
            output.status.code(),
            if tail.is_empty() { "no output" } else { tail.as_str() }
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Locate `binary` the way the shell would. Paths containing a separator
/// are checked directly.
pub fn find_on_path(binary: &str) -> Option<PathBuf> {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(binary);
        return path.is_file().then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Pull the outermost JSON object out of noisy stdout.
fn extract_json_object(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    (end > start).then(|| &stdout[start..=end])
}

pub fn parse_summary(stdout: &str) -> Result<Summary, String> {
    let trimmed = stdout.trim();
    if let Ok(summary) = serde_json::from_str::<Summary>(trimmed) {
        return Ok(summary);
    }
    let object = extract_json_object(trimmed)
        .ok_or_else(|| "Summarizer produced no JSON object".to_string())?;
    serde_json::from_str(object).map_err(|e| format!("Failed to parse summary JSON: {}", e))
}

// --- yt-dlp catalog ---

#[derive(Deserialize)]
struct FlatPlaylist {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

#[derive(Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

pub fn parse_flat_playlist(json: &str) -> Result<CatalogPlaylist, String> {
    let flat: FlatPlaylist =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse playlist JSON: {}", e))?;

    let items = flat
        .entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id?;
            let title = entry.title.unwrap_or_else(|| id.clone());
            Some(SourceItem { id, title })
        })
        .collect();

    Ok(CatalogPlaylist {
        title: flat.title.unwrap_or_else(|| flat.id.clone()),
        id: flat.id,
        items,
    })
}

pub struct YtDlpCatalog {
    ytdlp: String,
    timeout: Duration,
}

impl YtDlpCatalog {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ytdlp: tools.ytdlp.clone(),
            timeout: tools.catalog_timeout(),
        }
    }
}

impl CatalogFetcher for YtDlpCatalog {
    async fn fetch_playlist(&self, playlist_id: &str) -> Result<CatalogPlaylist, String> {
        let mut cmd = tokio::process::Command::new(&self.ytdlp);
        cmd.args(["--flat-playlist", "--dump-single-json", "--no-warnings"])
            .arg(playlist_url(playlist_id));
        let stdout = run_command(cmd, self.timeout).await?;
        parse_flat_playlist(&stdout)
    }
}

// --- Command summarizer ---

pub struct CommandSummarizer {
    config: SummarizerConfig,
}

impl CommandSummarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        Self { config }
    }
}

impl Summarizer for CommandSummarizer {
    async fn summarize(&self, video_id: &str, locale: &str) -> Result<Summary, String> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(self.config.render_args(&video_url(video_id), locale));
        let stdout = run_command(cmd, self.config.timeout()).await?;
        parse_summary(&stdout)
    }
}

// --- ffmpeg frame capture ---

/// Captures frames by resolving the direct stream URL with yt-dlp (once per
/// video) and seeking into it with ffmpeg.
pub struct FfmpegCapturer {
    ytdlp: String,
    ffmpeg: String,
    timeout: Duration,
    stream_urls: tokio::sync::Mutex<HashMap<String, String>>,
}

impl FfmpegCapturer {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ytdlp: tools.ytdlp.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            timeout: tools.capture_timeout(),
            stream_urls: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn stream_url(&self, video_id: &str) -> Result<String, String> {
        if let Some(url) = self.stream_urls.lock().await.get(video_id) {
            return Ok(url.clone());
        }

        let mut cmd = tokio::process::Command::new(&self.ytdlp);
        cmd.args(["-f", "best[ext=mp4]/best", "-g", "--no-warnings"])
            .arg(video_url(video_id));
        let stdout = run_command(cmd, self.timeout).await?;
        let url = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| format!("yt-dlp returned no stream URL for {}", video_id))?
            .to_string();

        self.stream_urls
            .lock()
            .await
            .insert(video_id.to_string(), url.clone());
        Ok(url)
    }
}

impl FrameCapturer for FfmpegCapturer {
    async fn capture(
        &self,
        video_id: &str,
        timestamp: &str,
        output_path: &Path,
    ) -> Result<(), String> {
        let stream = self.stream_url(video_id).await?;

        let mut cmd = tokio::process::Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-ss", timestamp, "-i"])
            .arg(&stream)
            .args(["-frames:v", "1", "-q:v", "2", "-y"])
            .arg(output_path);
        run_command(cmd, self.timeout).await?;

        match tokio::fs::metadata(output_path).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(format!("ffmpeg wrote an empty file at {}", timestamp)),
            Err(_) => {
                log_warn!(
                    "Warning: ffmpeg exited cleanly but {} is missing",
                    output_path.display()
                );
                Err(format!("ffmpeg produced no frame at {}", timestamp))
            }
        }
    }
}

// --- Mocks ---

/// Mock catalog returning a fixed playlist, or an error when `None`.
pub struct MockCatalog {
    playlist: Mutex<Option<CatalogPlaylist>>,
}

impl MockCatalog {
    pub fn new(playlist: Option<CatalogPlaylist>) -> Self {
        Self {
            playlist: Mutex::new(playlist),
        }
    }

    /// Replace the playlist, e.g. to simulate the source growing between runs.
    pub fn set_playlist(&self, playlist: Option<CatalogPlaylist>) {
        if let Ok(mut guard) = self.playlist.lock() {
            *guard = playlist;
        }
    }
}

impl CatalogFetcher for MockCatalog {
    async fn fetch_playlist(&self, playlist_id: &str) -> Result<CatalogPlaylist, String> {
        self.playlist
            .lock()
            .map_err(|_| "MockCatalog: poisoned".to_string())?
            .clone()
            .ok_or_else(|| format!("Playlist {} not found", playlist_id))
    }
}

/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Mock summarizer. Returns `default` for every video except those
/// configured to fail or to return a specific summary.
pub struct MockSummarizer {
    default: Summary,
    overrides: HashMap<String, Result<Summary, String>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    pub probe: ConcurrencyProbe,
}

impl MockSummarizer {
    pub fn new(default: Summary) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            probe: ConcurrencyProbe::default(),
        }
    }

    pub fn with_failure(mut self, video_id: &str, message: &str) -> Self {
        self.overrides
            .insert(video_id.to_string(), Err(message.to_string()));
        self
    }

    pub fn with_summary(mut self, video_id: &str, summary: Summary) -> Self {
        self.overrides.insert(video_id.to_string(), Ok(summary));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Video ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Summarizer for MockSummarizer {
    async fn summarize(&self, video_id: &str, _locale: &str) -> Result<Summary, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(video_id.to_string());
        }
        self.probe.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.probe.exit();

        match self.overrides.get(video_id) {
            Some(result) => result.clone(),
            None => Ok(self.default.clone()),
        }
    }
}

/// Mock capturer. Writes a placeholder file for every requested frame
/// except `(video_id, timestamp)` pairs configured to fail.
#[derive(Default)]
pub struct MockCapturer {
    failures: HashSet<(String, String)>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, video_id: &str, timestamp: &str) -> Self {
        self.failures
            .insert((video_id.to_string(), timestamp.to_string()));
        self
    }

    /// `(video_id, timestamp)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl FrameCapturer for MockCapturer {
    async fn capture(
        &self,
        video_id: &str,
        timestamp: &str,
        output_path: &Path,
    ) -> Result<(), String> {
        let key = (video_id.to_string(), timestamp.to_string());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        if self.failures.contains(&key) {
            return Err(format!("mock capture failed at {}", timestamp));
        }
        tokio::fs::write(output_path, b"frame")
            .await
            .map_err(|e| format!("Failed to write {}: {}", output_path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_playlist_id_accepts_urls_and_bare_ids() {
        assert_eq!(parse_playlist_id("PLabc_123-x").unwrap(), "PLabc_123-x");
        assert_eq!(
            parse_playlist_id("https://www.youtube.com/playlist?list=PLxyz").unwrap(),
            "PLxyz"
        );
        assert_eq!(
            parse_playlist_id("https://www.youtube.com/watch?v=abc&list=PLxyz&index=2").unwrap(),
            "PLxyz"
        );
    }

    #[test]
    fn parse_playlist_id_rejects_bad_input() {
        assert!(parse_playlist_id("https://www.youtube.com/watch?v=abc").is_err());
        assert!(parse_playlist_id("").is_err());
        assert!(parse_playlist_id("PL bad id").is_err());
        assert!(parse_playlist_id("https://x.test/?list=&a=1").is_err());
    }

    #[test]
    fn parse_flat_playlist_skips_entries_without_id() {
        let json = r#"{
            "id": "PL1",
            "title": "Talks",
            "entries": [
                {"id": "a", "title": "First"},
                {"id": null, "title": "Broken"},
                {"id": "b", "title": null}
            ]
        }"#;
        let playlist = parse_flat_playlist(json).unwrap();
        assert_eq!(playlist.id, "PL1");
        assert_eq!(playlist.title, "Talks");
        assert_eq!(
            playlist.items,
            vec![SourceItem::new("a", "First"), SourceItem::new("b", "b")]
        );
    }

    #[test]
    fn parse_summary_tolerates_log_noise() {
        let stdout = "loading model...\n{\"overview\": \"o\", \"sections\": [{\"timestamp\": \"1:00\"}], \"keyPoints\": [\"k\"]}\ndone\n";
        let summary = parse_summary(stdout).unwrap();
        assert_eq!(summary.overview, "o");
        assert_eq!(summary.sections[0].timestamp, "1:00");
        assert_eq!(summary.key_points, vec!["k"]);
    }

    #[test]
    fn parse_summary_without_json_fails() {
        assert!(parse_summary("nothing here").is_err());
    }

    #[tokio::test]
    async fn run_command_returns_stdout() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let out = run_command(cmd, Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn run_command_reports_stderr_tail_on_failure() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        let err = run_command(cmd, Duration::from_secs(10)).await.unwrap_err();
        assert!(err.contains("Some(3)"), "{}", err);
        assert!(err.contains("boom"), "{}", err);
    }

    #[tokio::test]
    async fn run_command_enforces_timeout() {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run_command(cmd, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"), "{}", err);
    }
}
