//! Test fixtures: a scripted extractor and a ready-to-use pipeline

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use clipdrop::download::{
    DownloadJob, DownloadedMedia, ExtractError, Extractor, MediaMetadata, Pipeline, PipelineSettings, ProgressUpdate,
};
use clipdrop::storage::{CorrelationStore, Correlator, MemoryStore};
use clipdrop::telegram::transport::{CallbackEvent, TextMessage};

use super::recorder::RecordingTransport;

pub const CHAT_ID: i64 = 4242;

/// Extractor that never spawns anything.
///
/// Downloads write a small file named the way yt-dlp would, emit a couple of
/// progress samples and count how often they ran.
pub struct ScriptedExtractor {
    metadata: MediaMetadata,
    metadata_error: Option<ExtractError>,
    download_error: Mutex<Option<ExtractError>>,
    /// Report a path that was never written
    missing_output: bool,
    downloads: AtomicUsize,
    jobs: Mutex<Vec<DownloadJob>>,
}

impl Default for ScriptedExtractor {
    fn default() -> Self {
        Self {
            metadata: MediaMetadata {
                title: "Sample clip".to_string(),
                duration: Some(125),
                uploader: Some("Uploader".to_string()),
                thumbnail_url: Some("https://example.com/thumb.jpg".to_string()),
                view_count: Some(1_234),
            },
            metadata_error: None,
            download_error: Mutex::new(None),
            missing_output: false,
            downloads: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every download fails with `error`.
    pub fn failing_with(error: ExtractError) -> Self {
        let extractor = Self::default();
        *extractor.download_error.lock().unwrap() = Some(error);
        extractor
    }

    /// Metadata lookups fail with `error`.
    pub fn failing_metadata(error: ExtractError) -> Self {
        Self {
            metadata_error: Some(error),
            ..Self::default()
        }
    }

    /// Downloads succeed but point at a file that does not exist.
    pub fn reporting_missing_file() -> Self {
        Self {
            missing_output: true,
            ..Self::default()
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<DownloadJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_metadata(&self, _url: &str) -> Result<MediaMetadata, ExtractError> {
        if let Some(error) = &self.metadata_error {
            return Err(error.clone());
        }
        Ok(self.metadata.clone())
    }

    async fn download(
        &self,
        job: &DownloadJob,
        progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedMedia, ExtractError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(job.clone());

        // a partial file that only the request cleanup removes
        let partial = job.output_dir.join(format!("{}_x.part", job.prefix));
        std::fs::write(&partial, b"partial").map_err(|e| ExtractError::Failed(e.to_string()))?;

        for downloaded in [0u64, 512, 1024] {
            let _ = progress_tx.send(ProgressUpdate {
                downloaded_bytes: downloaded,
                total_bytes: Some(1024),
            });
        }

        if let Some(error) = self.download_error.lock().unwrap().clone() {
            return Err(error);
        }

        if self.missing_output {
            std::fs::remove_file(&partial).map_err(|e| ExtractError::Failed(e.to_string()))?;
            return Ok(DownloadedMedia {
                file_path: job.output_dir.join(format!("{}_gone.mp4", job.prefix)),
                title: None,
                uploader: None,
                width: None,
                height: None,
            });
        }

        let ext = if job.mode.is_audio() { "mp3" } else { "mp4" };
        let path = job.output_dir.join(format!("{}_x.{}", job.prefix, ext));
        std::fs::write(&path, vec![0u8; 1024]).map_err(|e| ExtractError::Failed(e.to_string()))?;
        std::fs::remove_file(&partial).map_err(|e| ExtractError::Failed(e.to_string()))?;

        Ok(DownloadedMedia {
            file_path: path,
            title: Some(self.metadata.title.clone()),
            uploader: self.metadata.uploader.clone(),
            width: None,
            height: None,
        })
    }
}

/// A pipeline wired to a recording transport, a scripted extractor and a
/// temporary output directory.
pub struct TestEnvironment {
    pub pipeline: Pipeline,
    pub transport: Arc<RecordingTransport>,
    pub extractor: Arc<ScriptedExtractor>,
    pub output_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_parts(ScriptedExtractor::new(), Arc::new(MemoryStore::new()))
    }

    pub fn with_extractor(extractor: ScriptedExtractor) -> Self {
        Self::with_parts(extractor, Arc::new(MemoryStore::new()))
    }

    pub fn with_parts(extractor: ScriptedExtractor, store: Arc<dyn CorrelationStore>) -> Self {
        Self::build(extractor, store, 50_000_000)
    }

    pub fn with_size_ceiling(size_ceiling: u64) -> Self {
        Self::build(ScriptedExtractor::new(), Arc::new(MemoryStore::new()), size_ceiling)
    }

    fn build(extractor: ScriptedExtractor, store: Arc<dyn CorrelationStore>, size_ceiling: u64) -> Self {
        let output_dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let extractor = Arc::new(extractor);
        let correlator = Arc::new(Correlator::new(store, Duration::from_secs(3600)));
        let settings = PipelineSettings {
            output_dir: output_dir.path().to_path_buf(),
            size_ceiling,
            progress_interval: Duration::from_secs(2),
        };
        let pipeline = Pipeline::new(
            transport.clone(),
            extractor.clone(),
            correlator,
            reqwest::Client::builder().timeout(Duration::from_secs(5)).build().unwrap(),
            settings,
        );

        Self {
            pipeline,
            transport,
            extractor,
            output_dir,
        }
    }

    /// Names of the files left in the output directory.
    pub fn leftover_files(&self) -> Vec<String> {
        std::fs::read_dir(self.output_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

pub fn text_message(message_id: i32, text: &str) -> TextMessage {
    TextMessage {
        chat_id: CHAT_ID,
        message_id,
        text: text.to_string(),
    }
}

pub fn callback(query_id: &str, menu_message_id: i32, data: &str) -> CallbackEvent {
    CallbackEvent {
        chat_id: CHAT_ID,
        message_id: menu_message_id,
        query_id: query_id.to_string(),
        data: data.to_string(),
    }
}

/// Serves one HTTP response on a local port and returns the base URL.
///
/// Without `content_length` the body is close-delimited, so the client only
/// learns its size while reading.
pub async fn serve_once(status: &'static str, body: Vec<u8>, content_length: bool) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let mut head = format!("HTTP/1.1 {}\r\nContent-Type: text/calendar\r\nConnection: close\r\n", status);
        if content_length {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{}", addr)
}
