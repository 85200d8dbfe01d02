//! yt-dlp adapter for the [`Extractor`] interface.
//!
//! yt-dlp runs as a child process on the blocking pool. Progress comes from a
//! machine-readable `--progress-template`, the final file path from an
//! `after_move` print, and failures are classified here so nothing above
//! this module inspects yt-dlp's text output.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::extractor::{DownloadJob, DownloadedMedia, ExtractError, Extractor, MediaMetadata, ProgressUpdate};
use crate::core::config;
use crate::core::error::truncate_diagnostic;

const PROGRESS_PREFIX: &str = "[progress]";
const RESULT_PREFIX: &str = "RESULT ";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";
const RESULT_TEMPLATE: &str = "after_move:RESULT %(.{filepath,title,uploader,width,height,ext})j";
const OUTPUT_TAIL_LINES: usize = 200;

/// Runs the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    bin: String,
    /// ffmpeg location; `None` when ffmpeg is unavailable and streams cannot be merged
    ffmpeg: Option<String>,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(bin: impl Into<String>, ffmpeg: Option<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            ffmpeg,
            timeout,
        }
    }

    /// Adapter configured from `YTDL_BIN`, `FFMPEG_BIN` and `YTDLP_TIMEOUT_SECS`.
    pub fn from_config(ffmpeg_available: bool) -> Self {
        let ffmpeg = ffmpeg_available.then(|| config::FFMPEG_BIN.clone());
        Self::new(config::YTDL_BIN.clone(), ffmpeg, config::download::ytdlp_timeout())
    }

    pub fn can_merge(&self) -> bool {
        self.ffmpeg.is_some()
    }

    fn metadata_args(url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ]
    }

    fn download_args(&self, job: &DownloadJob) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-f".into(),
            job.mode.format_selector(self.can_merge()),
            "--no-playlist".into(),
            "--max-filesize".into(),
            job.size_ceiling.to_string(),
            "-o".into(),
            job.output_template(),
            "--print".into(),
            RESULT_TEMPLATE.into(),
            // --print implies --quiet; progress and the size notice are still needed
            "--no-quiet".into(),
            "--progress".into(),
            "--newline".into(),
            "--progress-template".into(),
            PROGRESS_TEMPLATE.into(),
            "--no-warnings".into(),
        ];

        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.clone());
            if job.mode.is_audio() {
                args.extend(["-x", "--audio-format", "mp3", "--audio-quality", "192K"].map(String::from));
            } else {
                args.extend(["--merge-output-format", "mp4"].map(String::from));
            }
        }

        args.push(job.url.clone());
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, ExtractError> {
        let bin = self.bin.clone();
        let args = Self::metadata_args(url);
        let timeout = self.timeout;

        log::info!("🔍 Fetching metadata for {}", url);
        let output = tokio::task::spawn_blocking(move || {
            let child = Command::new(&bin)
                .args(&args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| ExtractError::Failed(format!("Failed to spawn {}: {}", bin, e)))?;
            wait_with_output_timeout(child, timeout)
        })
        .await
        .map_err(|e| ExtractError::Failed(format!("metadata task failed: {}", e)))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("yt-dlp metadata failed for {}: {}", url, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        parse_metadata_json(&stdout)
    }

    async fn download(
        &self,
        job: &DownloadJob,
        progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedMedia, ExtractError> {
        let bin = self.bin.clone();
        let args = self.download_args(job);
        let timeout = self.timeout;
        let job = job.clone();

        log::info!("⬇️  Downloading {} ({}) via yt-dlp", job.url, job.mode);
        log::debug!("yt-dlp args: {:?}", args);

        tokio::task::spawn_blocking(move || {
            let run = run_with_progress(&bin, &args, timeout, &progress_tx)?;
            finish_download(&job, run)
        })
        .await
        .map_err(|e| ExtractError::Failed(format!("download task failed: {}", e)))?
    }
}

/// Wait for a child process with a timeout. Kills the child on timeout.
fn wait_with_output_timeout(mut child: Child, timeout: Duration) -> Result<std::process::Output, ExtractError> {
    // Drain both pipes in the background so a chatty child cannot block on a full pipe.
    let stdout = child.stdout.take().map(spawn_drain);
    let stderr = child.stderr.take().map(spawn_drain);

    let status = wait_with_deadline(&mut child, timeout)?;

    let collect = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(std::process::Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn spawn_drain<R: Read + Send + 'static>(mut stream: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus, ExtractError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    log::error!("yt-dlp process timed out after {}s, killing", timeout.as_secs());
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExtractError::Failed(format!(
                        "yt-dlp process timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => return Err(ExtractError::Failed(format!("yt-dlp process failed: {}", e))),
        }
    }
}

/// What a finished download run left behind.
#[derive(Debug, Default)]
struct DownloadRun {
    success: bool,
    /// JSON payload of the `RESULT` line, when yt-dlp printed one
    result: Option<String>,
    /// Last lines of stdout and stderr, interleaved
    tail: String,
}

fn run_with_progress(
    bin: &str,
    args: &[String],
    timeout: Duration,
    progress_tx: &mpsc::UnboundedSender<ProgressUpdate>,
) -> Result<DownloadRun, ExtractError> {
    let mut child = Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            log::error!("Failed to spawn yt-dlp: {}", e);
            ExtractError::Failed(format!("Failed to spawn {}: {}", bin, e))
        })?;

    let tail = Arc::new(Mutex::new(VecDeque::<String>::new()));

    let stderr_handle = child.stderr.take().map(|stream| {
        let tail = Arc::clone(&tail);
        std::thread::spawn(move || {
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                log::debug!("yt-dlp stderr: {}", line);
                push_tail(&tail, line);
            }
        })
    });

    let stdout_handle = child.stdout.take().map(|stream| {
        let tail = Arc::clone(&tail);
        let tx = progress_tx.clone();
        std::thread::spawn(move || {
            let mut result = None;
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                if let Some(update) = parse_progress_line(&line) {
                    let _ = tx.send(update);
                    continue;
                }
                log::debug!("yt-dlp stdout: {}", line);
                if let Some(payload) = line.strip_prefix(RESULT_PREFIX) {
                    result = Some(payload.to_string());
                } else {
                    push_tail(&tail, line);
                }
            }
            result
        })
    });

    let status = wait_with_deadline(&mut child, timeout)?;

    let result = stdout_handle.and_then(|h| h.join().ok()).flatten();
    if let Some(h) = stderr_handle {
        let _ = h.join();
    }

    let tail = match tail.lock() {
        Ok(mut lines) => lines.make_contiguous().join("\n"),
        Err(_) => String::new(),
    };

    Ok(DownloadRun {
        success: status.success(),
        result,
        tail,
    })
}

fn push_tail(tail: &Mutex<VecDeque<String>>, line: String) {
    if let Ok(mut lines) = tail.lock() {
        lines.push_back(line);
        if lines.len() > OUTPUT_TAIL_LINES {
            lines.pop_front();
        }
    }
}

fn finish_download(job: &DownloadJob, run: DownloadRun) -> Result<DownloadedMedia, ExtractError> {
    if is_size_exceeded(&run.tail) {
        log::warn!("yt-dlp refused {}: larger than {} bytes", job.url, job.size_ceiling);
        return Err(ExtractError::SizeExceeded);
    }
    if !run.success {
        return Err(classify_failure(&run.tail));
    }

    if let Some(media) = run.result.as_deref().and_then(parse_result_line) {
        if media.file_path.exists() {
            return Ok(media);
        }
        log::warn!("yt-dlp reported {} but it does not exist", media.file_path.display());
    }

    // Older yt-dlp builds ignore the after_move print; look for the file ourselves.
    match find_downloaded_file(&job.output_dir, &job.prefix) {
        Some(file_path) => Ok(DownloadedMedia {
            file_path,
            title: None,
            uploader: None,
            width: None,
            height: None,
        }),
        None => Err(ExtractError::NoOutput(job.url.clone())),
    }
}

/// Parses a `[progress] <downloaded> <total> <estimate>` line.
///
/// yt-dlp prints `NA` for unknown fields; the exact total wins over the estimate.
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    let downloaded_bytes = parse_number(fields.next()?)?;
    let total = fields.next().and_then(parse_number);
    let estimate = fields.next().and_then(parse_number);

    Some(ProgressUpdate {
        downloaded_bytes,
        total_bytes: total.or(estimate).filter(|t| *t > 0),
    })
}

fn parse_number(field: &str) -> Option<u64> {
    if let Ok(v) = field.parse::<u64>() {
        return Some(v);
    }
    // Estimates come out as floats
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    filepath: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parses the JSON printed after the final file is in place.
pub fn parse_result_line(payload: &str) -> Option<DownloadedMedia> {
    let parsed: ResultLine = match serde_json::from_str(payload.trim()) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Unparseable yt-dlp result line: {}", e);
            return None;
        }
    };
    let file_path = PathBuf::from(parsed.filepath.filter(|p| !p.is_empty())?);
    Some(DownloadedMedia {
        file_path,
        title: parsed.title,
        uploader: parsed.uploader,
        width: parsed.width,
        height: parsed.height,
    })
}

#[derive(Debug, Deserialize)]
struct MetadataJson {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    view_count: Option<u64>,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Parses `--dump-single-json` output. For playlists the first entry is used.
pub fn parse_metadata_json(json: &str) -> Result<MediaMetadata, ExtractError> {
    let mut parsed: MetadataJson = serde_json::from_str(json.trim())
        .map_err(|e| ExtractError::Failed(format!("invalid metadata from yt-dlp: {}", e)))?;

    if parsed.kind.as_deref() == Some("playlist") {
        let first = parsed
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::Failed("playlist has no entries".to_string()))?;
        parsed = serde_json::from_value(first)
            .map_err(|e| ExtractError::Failed(format!("invalid playlist entry: {}", e)))?;
    }

    Ok(MediaMetadata {
        title: parsed.title.unwrap_or_else(|| "Unknown".to_string()),
        duration: parsed.duration.filter(|d| d.is_finite() && *d >= 0.0).map(|d| d as u64),
        uploader: parsed.uploader.or(parsed.channel),
        thumbnail_url: parsed.thumbnail,
        view_count: parsed.view_count,
    })
}

fn is_size_exceeded(output: &str) -> bool {
    output.contains("larger than max-filesize") || output.contains("File is larger than")
}

/// Turns yt-dlp's output into a structured failure.
pub fn classify_failure(output: &str) -> ExtractError {
    if is_size_exceeded(output) {
        return ExtractError::SizeExceeded;
    }
    let diagnostic = output
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| output.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("yt-dlp failed without output");
    ExtractError::Failed(truncate_diagnostic(diagnostic.trim()))
}

/// Finds the artifact yt-dlp wrote for `prefix`, skipping partial downloads.
pub fn find_downloaded_file(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let wanted = format!("{}_", prefix);
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(&wanted) && !is_partial_name(&name)
        })
        .max_by_key(|e| e.metadata().and_then(|m| m.modified()).ok())
        .map(|e| e.path())
}

/// yt-dlp's in-progress and fragment files.
pub fn is_partial_name(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag") || name.ends_with(".temp")
}
