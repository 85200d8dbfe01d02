//! Request pipeline: link → menu → button → download → upload.
//!
//! One [`Pipeline`] is shared by every handler. Each inbound event is driven
//! to completion (or to the menu) by a single call, which returns a
//! [`RequestReport`] with the stages it walked through.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use url::Url;

use super::extractor::{DownloadJob, DownloadedMedia, ExtractError, Extractor, ProgressUpdate};
use super::http;
use super::mode::DownloadMode;
use super::progress::ProgressReporter;
use super::stage::{RequestOutcome, RequestReport, Stage, StageTracker};
use super::ytdlp::is_partial_name;
use crate::core::config;
use crate::core::error::{AppError, RequestError};
use crate::core::utils::{extract_url, is_calendar_link};
use crate::storage::{generate_token, Correlator, PendingRequest, TOKEN_LEN};
use crate::telegram::keyboard::{build_mode_menu, CallbackAction};
use crate::telegram::messages;
use crate::telegram::transport::{
    AudioMeta, CallbackEvent, ChatTransport, SendOptions, TextMessage, TransportError, VideoMeta,
};

/// Knobs the pipeline needs from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub size_ceiling: u64,
    pub progress_interval: Duration,
}

impl PipelineSettings {
    pub fn from_config() -> Self {
        Self {
            output_dir: PathBuf::from(config::DOWNLOAD_FOLDER.as_str()),
            size_ceiling: *config::download::MAX_FILESIZE,
            progress_interval: config::progress::update_interval(),
        }
    }
}

/// A file in the output directory owned by one request.
///
/// Removed when dropped, whatever path the run took.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove artifact {}: {}", self.path.display(), e),
        }
    }
}

/// Removes every file in `dir` that belongs to the request `prefix`,
/// including partial downloads. Returns how many were removed.
pub fn cleanup_request_files(dir: &Path, prefix: &str) -> usize {
    let wanted = format!("{}_", prefix);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&wanted) && std::fs::remove_file(entry.path()).is_ok() {
            log::debug!("Removed leftover file {}", name);
            removed += 1;
        }
    }
    removed
}

/// Whether `name` is `<token>_...`, i.e. a file some request created.
pub fn is_request_owned_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > TOKEN_LEN
        && bytes[TOKEN_LEN] == b'_'
        && bytes[..TOKEN_LEN]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

/// Removes request-owned files in `dir` last modified more than `max_age` ago.
///
/// Catches artifacts left behind by a crash or a kill in the middle of a run.
/// Anything not named after a request token is left alone.
pub fn sweep_stale_artifacts(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let now = SystemTime::now();

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || !is_request_owned_name(&name) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if matches!(age, Some(age) if age > max_age) && std::fs::remove_file(&path).is_ok() {
            log::info!(
                "🧹 Removed stale {}{}",
                if is_partial_name(&name) { "partial download " } else { "file " },
                name
            );
            removed += 1;
        }
    }
    removed
}

impl From<ExtractError> for RequestError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::SizeExceeded => RequestError::SizeExceeded,
            ExtractError::NoOutput(url) => RequestError::FileNotFound(url),
            ExtractError::Failed(diag) => RequestError::ExtractionFailure(diag),
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::EntityTooLarge => RequestError::SizeExceeded,
            TransportError::Api(diag) => RequestError::TransportFailure(diag),
        }
    }
}

/// User mistakes (no link, too large, stale menu) are routine; the rest is worth a warning.
fn log_failure(what: &str, error: &RequestError) {
    if error.is_user_actionable() {
        log::info!("{} failed [{}]: {}", what, error.subcategory(), error);
    } else {
        log::warn!("{} failed [{}]: {}", what, error.subcategory(), error);
    }
}

/// Drives single requests through their stages.
pub struct Pipeline {
    transport: Arc<dyn ChatTransport>,
    extractor: Arc<dyn Extractor>,
    correlator: Arc<Correlator>,
    http: reqwest::Client,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        extractor: Arc<dyn Extractor>,
        correlator: Arc<Correlator>,
        http: reqwest::Client,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            extractor,
            correlator,
            http,
            settings,
        }
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Handles a text message: calendar links are fetched right away,
    /// anything else with a link gets the mode menu.
    pub async fn handle_text(&self, msg: &TextMessage) -> RequestReport {
        let mut tracker = StageTracker::new();

        let Some(url) = extract_url(&msg.text) else {
            log::debug!("No link in message {} from chat {}", msg.message_id, msg.chat_id);
            let error = RequestError::InvalidInput("no link in message".to_string());
            let options = SendOptions {
                reply_to: Some(msg.message_id),
                keyboard: None,
            };
            if let Err(e) = self.transport.send_text(msg.chat_id, &error.user_message(), options).await {
                log::warn!("Failed to send no-link notice to {}: {}", msg.chat_id, e);
            }
            return tracker.finish(RequestOutcome::Failed { error });
        };

        tracker.advance(Stage::Analyzing);
        if is_calendar_link(url) {
            return self.fetch_calendar(msg, url, tracker).await;
        }

        let status_text = messages::analyzing();
        let status_id = match self
            .transport
            .send_text(
                msg.chat_id,
                status_text,
                SendOptions {
                    reply_to: Some(msg.message_id),
                    keyboard: None,
                },
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to send status to chat {}: {}", msg.chat_id, e);
                return tracker.finish(RequestOutcome::Failed { error: e.into() });
            }
        };

        match self.show_menu(msg, url, status_id).await {
            Ok((token, request)) => {
                tracker.advance(Stage::AwaitingModeChoice);
                log::info!("📋 Menu shown for {} in chat {} (token {})", request.url, msg.chat_id, token);
                tracker.finish(RequestOutcome::AwaitingChoice { token, request })
            }
            Err(error) => {
                log_failure(&format!("Request from chat {}", msg.chat_id), &error);
                self.notify_failure(msg.chat_id, status_id, &error).await;
                tracker.finish(RequestOutcome::Failed { error })
            }
        }
    }

    /// Analyzing → AwaitingModeChoice. The status message is only removed once
    /// the menu is out, so on error it is still there to carry the notice.
    async fn show_menu(
        &self,
        msg: &TextMessage,
        url: &str,
        status_id: i32,
    ) -> Result<(String, PendingRequest), RequestError> {
        Url::parse(url).map_err(|e| RequestError::InvalidInput(format!("{}: {}", url, e)))?;

        let meta = self.extractor.fetch_metadata(url).await?;
        log::info!("🔍 {} -> \"{}\"", url, meta.title);

        let request = PendingRequest::new(url, msg.chat_id, msg.message_id);
        let token = self.correlator.register(request.clone()).await.map_err(|e: AppError| {
            log::error!("Failed to register request for {}: {}", url, e);
            RequestError::CorrelationUnavailable(e.to_string())
        })?;

        let caption = messages::menu_caption(&meta);
        let options = SendOptions {
            reply_to: Some(msg.message_id),
            keyboard: Some(build_mode_menu(&token)),
        };

        let mut sent = match &meta.thumbnail_url {
            Some(thumb) => self.transport.send_photo(msg.chat_id, thumb, &caption, options.clone()).await,
            None => Err(TransportError::Api("no thumbnail".to_string())),
        };
        if let Err(e) = &sent {
            if meta.thumbnail_url.is_some() {
                log::warn!("Photo menu failed for {}, falling back to text: {}", url, e);
            }
            sent = self.transport.send_text(msg.chat_id, &caption, options).await;
        }

        match sent {
            Ok(_) => {
                self.delete_quietly(msg.chat_id, status_id).await;
                Ok((
                    token.clone(),
                    PendingRequest {
                        token,
                        ..request
                    },
                ))
            }
            Err(e) => {
                self.correlator.discard(&token).await;
                Err(e.into())
            }
        }
    }

    /// Handles a button press on a mode menu.
    pub async fn handle_callback(&self, event: &CallbackEvent) -> RequestReport {
        let mut tracker = StageTracker::resumed(Stage::AwaitingModeChoice);

        let action = match CallbackAction::parse(&event.data) {
            Some(action) => action,
            None => {
                log::warn!("Unknown callback payload from chat {}: {:?}", event.chat_id, event.data);
                self.answer_quietly(&event.query_id, Some("❌ Unknown action")).await;
                return tracker.finish(RequestOutcome::Failed {
                    error: RequestError::InvalidInput(event.data.clone()),
                });
            }
        };

        match action {
            CallbackAction::Cancel { token } => {
                self.correlator.discard(&token).await;
                self.answer_quietly(&event.query_id, None).await;
                self.delete_quietly(event.chat_id, event.message_id).await;
                log::info!("Request {} cancelled in chat {}", token, event.chat_id);
                tracker.advance(Stage::Done);
                tracker.finish(RequestOutcome::Cancelled { token })
            }
            CallbackAction::Download { mode, token } => {
                let Some(request) = self.correlator.resolve(&token, event.chat_id).await else {
                    let error = RequestError::ExpiredSession;
                    log::info!("Expired or foreign token {} from chat {}", token, event.chat_id);
                    self.answer_quietly(&event.query_id, Some(&error.user_message())).await;
                    return tracker.finish(RequestOutcome::Failed { error });
                };

                self.answer_quietly(&event.query_id, None).await;
                let outcome = self.deliver(event, request.with_mode(mode), &mut tracker).await;
                tracker.finish(outcome)
            }
        }
    }

    /// Downloading → Uploading → Done, or Failed from any of them.
    async fn deliver(
        &self,
        event: &CallbackEvent,
        request: PendingRequest,
        tracker: &mut StageTracker,
    ) -> RequestOutcome {
        let mode = request.mode.unwrap_or(DownloadMode::Best);
        let chat_id = event.chat_id;
        let status_id = event.message_id;

        tracker.advance(Stage::Downloading);
        self.edit_quietly(chat_id, status_id, &messages::starting(mode)).await;

        let result = self.download_and_upload(&request, mode, chat_id, status_id, tracker).await;

        // Leftovers (fragments, pre-merge streams) go on every terminal path.
        let leftovers = cleanup_request_files(&self.settings.output_dir, &request.token);
        if leftovers > 0 {
            log::debug!("Removed {} leftover files for {}", leftovers, request.token);
        }

        match result {
            Ok(()) => {
                self.delete_quietly(chat_id, status_id).await;
                log::info!("✅ Delivered {} ({}) to chat {}", request.url, mode, chat_id);
                tracker.advance(Stage::Done);
                RequestOutcome::Delivered { mode: Some(mode) }
            }
            Err(error) => {
                log_failure(&format!("Request {} for {}", request.token, request.url), &error);
                self.notify_failure(chat_id, status_id, &error).await;
                RequestOutcome::Failed { error }
            }
        }
    }

    async fn download_and_upload(
        &self,
        request: &PendingRequest,
        mode: DownloadMode,
        chat_id: i64,
        status_id: i32,
        tracker: &mut StageTracker,
    ) -> Result<(), RequestError> {
        std::fs::create_dir_all(&self.settings.output_dir)
            .map_err(|e| RequestError::ExtractionFailure(format!("cannot create output folder: {}", e)))?;

        let job = DownloadJob {
            url: request.url.clone(),
            mode,
            size_ceiling: self.settings.size_ceiling,
            output_dir: self.settings.output_dir.clone(),
            prefix: request.token.clone(),
        };

        let media = self.download_with_progress(&job, chat_id, status_id).await?;
        let artifact = Artifact::new(media.file_path.clone());
        if !artifact.path().is_file() {
            return Err(RequestError::FileNotFound(artifact.path().display().to_string()));
        }

        tracker.advance(Stage::Uploading);
        self.edit_quietly(chat_id, status_id, messages::uploading()).await;

        self.upload(chat_id, mode, &media, artifact.path()).await?;
        Ok(())
    }

    async fn download_with_progress(
        &self,
        job: &DownloadJob,
        chat_id: i64,
        status_id: i32,
    ) -> Result<DownloadedMedia, RequestError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        let mut reporter = ProgressReporter::new(self.settings.progress_interval);

        let forward = async {
            while let Some(update) = rx.recv().await {
                if let Some(text) = reporter.on_progress(update.downloaded_bytes, update.total_bytes, Instant::now()) {
                    if let Err(e) = self
                        .transport
                        .edit_caption_or_text(chat_id, status_id, &messages::downloading(&text))
                        .await
                    {
                        log::debug!("Progress edit failed for chat {}: {}", chat_id, e);
                    }
                }
            }
        };

        // `tx` moves into the download, so the forwarder ends when it returns.
        let (result, ()) = tokio::join!(self.extractor.download(job, tx), forward);
        Ok(result?)
    }

    async fn upload(
        &self,
        chat_id: i64,
        mode: DownloadMode,
        media: &DownloadedMedia,
        path: &Path,
    ) -> Result<(), RequestError> {
        let username = self.transport.bot_username();
        let title = media.title.clone().unwrap_or_else(|| {
            if mode.is_audio() {
                "Audio".to_string()
            } else {
                "Video".to_string()
            }
        });

        if mode.is_audio() {
            let meta = AudioMeta {
                caption: messages::audio_caption(&title, username.as_deref()),
                performer: media.uploader.clone().unwrap_or_else(|| "Unknown".to_string()),
                title,
            };
            self.transport.send_audio(chat_id, path, meta).await?;
        } else {
            let meta = VideoMeta {
                caption: messages::video_caption(&title, mode, username.as_deref()),
                width: media.width,
                height: media.height,
            };
            self.transport.send_video(chat_id, path, meta).await?;
        }
        Ok(())
    }

    /// `.ics` links: fetched over HTTP and sent as a document, no menu.
    async fn fetch_calendar(&self, msg: &TextMessage, url: &str, mut tracker: StageTracker) -> RequestReport {
        let status_id = match self
            .transport
            .send_text(
                msg.chat_id,
                messages::calendar_fetching(),
                SendOptions {
                    reply_to: Some(msg.message_id),
                    keyboard: None,
                },
            )
            .await
        {
            Ok(id) => id,
            Err(e) => return tracker.finish(RequestOutcome::Failed { error: e.into() }),
        };

        tracker.advance(Stage::Downloading);
        let prefix = generate_token();
        let fetched = match http::fetch_to_file(
            &self.http,
            url,
            &self.settings.output_dir,
            &prefix,
            self.settings.size_ceiling,
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                let error = match e {
                    AppError::FileTooLarge { .. } => RequestError::SizeExceeded,
                    _ => RequestError::ExtractionFailure(e.to_string()),
                };
                log::warn!("Calendar fetch {} failed: {}", url, e);
                cleanup_request_files(&self.settings.output_dir, &prefix);
                self.notify_failure(msg.chat_id, status_id, &error).await;
                return tracker.finish(RequestOutcome::Failed { error });
            }
        };
        let artifact = Artifact::new(fetched.path);

        tracker.advance(Stage::Uploading);
        self.edit_quietly(msg.chat_id, status_id, messages::sending_file()).await;

        match self
            .transport
            .send_document(msg.chat_id, artifact.path(), &fetched.file_name)
            .await
        {
            Ok(_) => {
                self.delete_quietly(msg.chat_id, status_id).await;
                tracker.advance(Stage::Done);
                tracker.finish(RequestOutcome::Delivered { mode: None })
            }
            Err(e) => {
                let error: RequestError = e.into();
                self.notify_failure(msg.chat_id, status_id, &error).await;
                tracker.finish(RequestOutcome::Failed { error })
            }
        }
    }

    /// Shows the single failure notice. Errors sending it are only logged.
    async fn notify_failure(&self, chat_id: i64, message_id: i32, error: &RequestError) {
        if let Err(e) = self
            .transport
            .edit_caption_or_text(chat_id, message_id, &error.user_message())
            .await
        {
            log::warn!("Failed to show error in chat {}: {}", chat_id, e);
        }
    }

    async fn edit_quietly(&self, chat_id: i64, message_id: i32, text: &str) {
        if let Err(e) = self.transport.edit_caption_or_text(chat_id, message_id, text).await {
            log::debug!("Status edit failed for chat {}: {}", chat_id, e);
        }
    }

    async fn delete_quietly(&self, chat_id: i64, message_id: i32) {
        if let Err(e) = self.transport.delete_message(chat_id, message_id).await {
            log::debug!("Failed to delete message {} in chat {}: {}", message_id, chat_id, e);
        }
    }

    async fn answer_quietly(&self, query_id: &str, text: Option<&str>) {
        if let Err(e) = self.transport.answer_callback(query_id, text).await {
            log::debug!("Failed to answer callback {}: {}", query_id, e);
        }
    }
}
