//! In-memory collaborators for tests and local experiments.
//!
//! Each double records what the engine did to it so tests can assert on
//! writes, uploads and frames without a database, S3 or ffmpeg.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use image::{Rgb, RgbImage};
use mediaq_core::ffmpeg::{FfprobeOutput, MediaMetadata, TranscodeProfile};
use mediaq_core::job::{JobKind, JobParams};
use mediaq_core::naming::file_extension;
use mediaq_core::types::{DbId, JobId};
use mediaq_db::models::detection_model::DetectionModel;
use mediaq_db::models::inference_task::InferenceTask;
use mediaq_db::models::job_record::UpdateJobRecord;
use mediaq_db::models::media::{Media, UpdateMediaMetadata};
use mediaq_db::models::status::JobStatus;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::detector::{DetectionRequest, Detector, FrameSource};
use crate::error::JobError;
use crate::queue::{ClaimedJob, JobQueue};
use crate::store::RecordStore;
use crate::tools::{FrameWriter, Prober, TranscodeProgress, Transcoder};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

macro_rules! merge_job_record {
    ($row:expr, $patch:expr) => {{
        let row = $row;
        let patch = $patch;
        if let Some(v) = patch.status_id {
            row.status_id = v;
        }
        if let Some(v) = patch.progress {
            row.progress = v;
        }
        if let Some(v) = patch.start_time {
            row.start_time = Some(v);
        }
        if let Some(v) = patch.end_time {
            row.end_time = Some(v);
        }
        if let Some(v) = &patch.result {
            row.result = Some(v.clone());
        }
        if let Some(v) = &patch.result_key {
            row.result_key = Some(v.clone());
        }
        if let Some(v) = &patch.error_message {
            row.error_message = Some(v.clone());
        }
        if let Some(v) = &patch.error_kind {
            row.error_kind = Some(v.clone());
        }
    }};
}

#[derive(Default)]
struct RecordState {
    next_id: DbId,
    media: HashMap<DbId, Media>,
    models: HashMap<DbId, DetectionModel>,
    tasks: HashMap<JobId, InferenceTask>,
    progress: Vec<(JobId, i16)>,
    metadata_writes: Vec<(DbId, UpdateMediaMetadata)>,
}

impl RecordState {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

/// [`RecordStore`] keeping rows in memory and logging every progress value.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<RecordState>,
    fail_progress: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_media(&self, blob_key: &str, media_type: &str) -> DbId {
        let mut state = lock(&self.state);
        let id = state.next_id();
        let now = Utc::now();
        state.media.insert(
            id,
            Media {
                id,
                blob_key: blob_key.to_string(),
                original_name: None,
                media_type: media_type.to_string(),
                width: None,
                height: None,
                duration_secs: None,
                video_codec: None,
                file_extension: None,
                job_id: None,
                status_id: JobStatus::Pending.id(),
                progress: 0,
                start_time: None,
                end_time: None,
                result: None,
                result_key: None,
                error_message: None,
                error_kind: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn insert_model(&self, artifact_path: &str) -> DbId {
        let mut state = lock(&self.state);
        let id = state.next_id();
        let now = Utc::now();
        state.models.insert(
            id,
            DetectionModel {
                id,
                name: format!("model-{id}"),
                artifact_path: artifact_path.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Insert the PENDING task row owning inference job `job_id`.
    pub fn insert_task(&self, job_id: JobId, kind: JobKind, media_id: DbId, model_id: DbId) {
        let mut state = lock(&self.state);
        let id = state.next_id();
        let now = Utc::now();
        state.tasks.insert(
            job_id,
            InferenceTask {
                id,
                kind: kind.as_str().to_string(),
                media_id,
                model_id,
                params: serde_json::Value::Null,
                job_id,
                status_id: JobStatus::Pending.id(),
                progress: 0,
                start_time: None,
                end_time: None,
                result: None,
                result_key: None,
                error_message: None,
                error_kind: None,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Make `job_id` the conversion job of `media_id`, resetting its record.
    /// Returns `false` if the media row is absent.
    pub fn stamp_media_job(&self, media_id: DbId, job_id: JobId) -> bool {
        let mut state = lock(&self.state);
        let Some(media) = state.media.get_mut(&media_id) else {
            return false;
        };
        media.job_id = Some(job_id);
        media.status_id = JobStatus::Pending.id();
        media.progress = 0;
        media.start_time = None;
        media.end_time = None;
        media.result = None;
        media.result_key = None;
        media.error_message = None;
        media.error_kind = None;
        true
    }

    pub fn media(&self, id: DbId) -> Option<Media> {
        lock(&self.state).media.get(&id).cloned()
    }

    pub fn task(&self, job_id: JobId) -> Option<InferenceTask> {
        lock(&self.state).tasks.get(&job_id).cloned()
    }

    pub fn has_model(&self, id: DbId) -> bool {
        lock(&self.state).models.contains_key(&id)
    }

    /// Status of the row owning `job_id`, whichever table it lives in.
    pub fn job_status(&self, job_id: JobId) -> Option<JobStatus> {
        let state = lock(&self.state);
        let status = match state.tasks.get(&job_id) {
            Some(task) => task.status_id,
            None => state.media.values().find(|m| m.job_id == Some(job_id))?.status_id,
        };
        JobStatus::from_id(status)
    }

    /// Every progress value persisted for `job_id`, in write order.
    pub fn progress_history(&self, job_id: JobId) -> Vec<i16> {
        lock(&self.state)
            .progress
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn metadata_writes(&self, media_id: DbId) -> Vec<UpdateMediaMetadata> {
        lock(&self.state)
            .metadata_writes
            .iter()
            .filter(|(id, _)| *id == media_id)
            .map(|(_, w)| w.clone())
            .collect()
    }

    /// Make progress-only writes fail with a storage error.
    pub fn fail_progress_writes(&self, fail: bool) {
        self.fail_progress.store(fail, Ordering::SeqCst);
    }

    /// Put a running owning record back to pending for redelivery.
    fn reset_job(&self, job_id: JobId) {
        let mut state = lock(&self.state);
        let (running, pending) = (JobStatus::Running.id(), JobStatus::Pending.id());
        if let Some(task) = state.tasks.get_mut(&job_id).filter(|t| t.status_id == running) {
            task.status_id = pending;
            task.progress = 0;
            task.start_time = None;
        }
        if let Some(media) = state
            .media
            .values_mut()
            .find(|m| m.job_id == Some(job_id) && m.status_id == running)
        {
            media.status_id = pending;
            media.progress = 0;
            media.start_time = None;
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_media(&self, id: DbId) -> Result<Option<Media>, JobError> {
        Ok(self.media(id))
    }

    async fn find_model(&self, id: DbId) -> Result<Option<DetectionModel>, JobError> {
        Ok(lock(&self.state).models.get(&id).cloned())
    }

    async fn find_task(&self, job_id: JobId) -> Result<Option<InferenceTask>, JobError> {
        Ok(self.task(job_id))
    }

    async fn update_media_metadata(
        &self,
        id: DbId,
        patch: &UpdateMediaMetadata,
    ) -> Result<(), JobError> {
        let mut state = lock(&self.state);
        let media = state
            .media
            .get_mut(&id)
            .ok_or_else(|| JobError::not_found("media", id))?;
        if let Some(v) = &patch.blob_key {
            media.blob_key = v.clone();
        }
        if let Some(v) = patch.width {
            media.width = Some(v);
        }
        if let Some(v) = patch.height {
            media.height = Some(v);
        }
        if let Some(v) = patch.duration_secs {
            media.duration_secs = Some(v);
        }
        if let Some(v) = &patch.video_codec {
            media.video_codec = Some(v.clone());
        }
        if let Some(v) = &patch.file_extension {
            media.file_extension = Some(v.clone());
        }
        if let Some(v) = patch.progress {
            media.progress = v;
        }
        let owner = media.job_id;
        if let (Some(job_id), Some(progress)) = (owner, patch.progress) {
            state.progress.push((job_id, progress));
        }
        state.metadata_writes.push((id, patch.clone()));
        Ok(())
    }

    async fn update_job_record(
        &self,
        kind: JobKind,
        job_id: JobId,
        patch: &UpdateJobRecord,
    ) -> Result<bool, JobError> {
        let progress_only = patch.progress.is_some()
            && *patch == UpdateJobRecord::progress(patch.progress.unwrap_or_default());
        if progress_only && self.fail_progress.load(Ordering::SeqCst) {
            return Err(JobError::Storage("progress write rejected".into()));
        }

        let mut state = lock(&self.state);
        let found = if kind.is_inference() {
            match state.tasks.get_mut(&job_id) {
                Some(task) => {
                    merge_job_record!(task, patch);
                    true
                }
                None => false,
            }
        } else {
            match state.media.values_mut().find(|m| m.job_id == Some(job_id)) {
                Some(media) => {
                    merge_job_record!(media, patch);
                    true
                }
                None => false,
            }
        };
        if let (true, Some(progress)) = (found, patch.progress) {
            state.progress.push((job_id, progress));
        }
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), bytes);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Sorted keys stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), JobError> {
        let bytes = self
            .object(bucket, key)
            .ok_or_else(|| JobError::not_found("blob", format!("{bucket}/{key}")))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), JobError> {
        let bytes = tokio::fs::read(src).await?;
        self.insert(bucket, key, bytes);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Media tools
// ---------------------------------------------------------------------------

/// Content the fake transcoder writes; the fake prober reports such files
/// as H.264/AAC.
pub const TRANSCODED_MARKER: &[u8] = b"fake-h264-aac";

/// [`Prober`] returning fixed metadata for sources and H.264 for files the
/// [`FakeTranscoder`] produced.
pub struct FakeProber {
    source: MediaMetadata,
    fail: bool,
    /// Raw ffprobe JSON parsed on every probe instead of `source`.
    ffprobe_json: Option<String>,
}

impl FakeProber {
    pub fn new(source: MediaMetadata) -> Self {
        Self {
            source,
            fail: false,
            ffprobe_json: None,
        }
    }

    /// Source video of the given geometry and length.
    pub fn video(width: i32, height: i32, duration_secs: f64, frame_rate: f64) -> Self {
        Self::new(MediaMetadata {
            width,
            height,
            duration_secs,
            video_codec: "mpeg4".to_string(),
            audio_codec: Some("mp3".to_string()),
            frame_rate,
            total_frames: (duration_secs * frame_rate).round() as i64,
            file_extension: String::new(),
        })
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::video(0, 0, 0.0, 0.0)
        }
    }

    /// Interpret `json` as ffprobe output, the way the real prober does.
    pub fn from_ffprobe_json(json: &str) -> Self {
        Self {
            ffprobe_json: Some(json.to_string()),
            ..Self::video(0, 0, 0.0, 0.0)
        }
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata, JobError> {
        if self.fail {
            return Err(JobError::ExternalTool {
                tool: "ffprobe",
                exit_code: Some(1),
                message: "Invalid data found when processing input".into(),
            });
        }
        if let Some(json) = &self.ffprobe_json {
            let output: FfprobeOutput =
                serde_json::from_str(json).map_err(|e| JobError::tool("ffprobe", e.to_string()))?;
            return MediaMetadata::from_probe(&output, path).map_err(|e| JobError::from_ffmpeg("ffprobe", e));
        }
        let bytes = tokio::fs::read(path).await?;
        let mut metadata = self.source.clone();
        if bytes.starts_with(TRANSCODED_MARKER) {
            metadata.video_codec = "h264".to_string();
            metadata.audio_codec = Some("aac".to_string());
        }
        metadata.file_extension = file_extension(&path.to_string_lossy());
        Ok(metadata)
    }
}

#[derive(Debug, Default)]
struct FrameLog {
    opened: usize,
    written: usize,
    finished: usize,
}

/// [`Transcoder`] that replays scripted progress and writes marker files.
#[derive(Default)]
pub struct FakeTranscoder {
    steps: Vec<Duration>,
    fail_exit: Option<i32>,
    finish_exit: Option<i32>,
    profiles: Mutex<Vec<TranscodeProfile>>,
    frames: Arc<Mutex<FrameLog>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report these elapsed times (in seconds) during every transcode.
    pub fn with_progress(mut self, elapsed_secs: &[f64]) -> Self {
        self.steps = elapsed_secs.iter().map(|s| Duration::from_secs_f64(*s)).collect();
        self
    }

    /// Exit with `code` after reporting progress and writing partial output.
    pub fn failing(mut self, code: i32) -> Self {
        self.fail_exit = Some(code);
        self
    }

    /// Frame writers exit with `code` when their input is closed.
    pub fn failing_finish(mut self, code: i32) -> Self {
        self.finish_exit = Some(code);
        self
    }

    pub fn profiles(&self) -> Vec<TranscodeProfile> {
        lock(&self.profiles).clone()
    }

    pub fn frames_written(&self) -> usize {
        lock(&self.frames).written
    }

    pub fn writers_opened(&self) -> usize {
        lock(&self.frames).opened
    }

    pub fn writers_finished(&self) -> usize {
        lock(&self.frames).finished
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        profile: &TranscodeProfile,
        progress: &dyn TranscodeProgress,
    ) -> Result<(), JobError> {
        lock(&self.profiles).push(profile.clone());
        if !src.exists() {
            return Err(JobError::tool("ffmpeg", format!("{}: No such file", src.display())));
        }
        for step in &self.steps {
            progress.on_elapsed(*step).await;
        }
        if let Some(code) = self.fail_exit {
            tokio::fs::write(dst, b"partial").await?;
            return Err(JobError::ExternalTool {
                tool: "ffmpeg",
                exit_code: Some(code),
                message: "Conversion failed!".into(),
            });
        }
        tokio::fs::write(dst, TRANSCODED_MARKER).await?;
        Ok(())
    }

    async fn open_frame_writer(
        &self,
        dst: &Path,
        _fps: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameWriter>, JobError> {
        tokio::fs::write(dst, b"").await?;
        lock(&self.frames).opened += 1;
        Ok(Box::new(MemoryFrameWriter {
            path: dst.to_path_buf(),
            log: Arc::clone(&self.frames),
            width,
            height,
            finish_exit: self.finish_exit,
        }))
    }
}

struct MemoryFrameWriter {
    path: PathBuf,
    log: Arc<Mutex<FrameLog>>,
    width: u32,
    height: u32,
    finish_exit: Option<i32>,
}

#[async_trait]
impl FrameWriter for MemoryFrameWriter {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<(), JobError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(JobError::tool("ffmpeg", "frame size mismatch"));
        }
        lock(&self.log).written += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), JobError> {
        if let Some(code) = self.finish_exit {
            return Err(JobError::ExternalTool {
                tool: "ffmpeg",
                exit_code: Some(code),
                message: "Broken pipe".into(),
            });
        }
        tokio::fs::write(&self.path, b"raw-frames").await?;
        lock(&self.log).finished += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// What the engine asked the detector for.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDetection {
    pub model_path: PathBuf,
    pub class_indices: BTreeSet<u32>,
    pub confidence: f32,
}

/// [`Detector`] producing solid-colour frames.
pub struct FakeDetector {
    frames: usize,
    frame_size: (u32, u32),
    cancel_after: Option<(usize, CancellationToken)>,
    fail: bool,
    fail_at: Option<usize>,
    pulled: Arc<AtomicUsize>,
    requests: Mutex<Vec<RecordedDetection>>,
}

impl Default for FakeDetector {
    fn default() -> Self {
        Self {
            frames: 0,
            frame_size: (16, 9),
            cancel_after: None,
            fail: false,
            fail_at: None,
            pulled: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Video mode yields `count` frames of `width`x`height`.
    pub fn with_frames(mut self, count: usize, width: u32, height: u32) -> Self {
        self.frames = count;
        self.frame_size = (width, height);
        self
    }

    /// Cancel `token` while producing frame number `frame` (1-based).
    pub fn cancel_after(mut self, frame: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((frame, token));
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Video mode errors while producing frame number `frame` (1-based).
    pub fn fail_at_frame(mut self, frame: usize) -> Self {
        self.fail_at = Some(frame);
        self
    }

    /// Frames handed out so far across all video runs.
    pub fn frames_pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedDetection> {
        lock(&self.requests).clone()
    }

    fn record(&self, request: &DetectionRequest<'_>) -> Result<(), JobError> {
        lock(&self.requests).push(RecordedDetection {
            model_path: request.model_path.to_path_buf(),
            class_indices: request.params.class_indices.clone(),
            confidence: request.params.confidence,
        });
        if self.fail {
            return Err(JobError::ExternalTool {
                tool: "detector",
                exit_code: Some(2),
                message: "model weights unreadable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn predict_image(&self, request: DetectionRequest<'_>) -> Result<RgbImage, JobError> {
        self.record(&request)?;
        let (w, h) = self.frame_size;
        Ok(RgbImage::from_pixel(w, h, Rgb([255, 0, 0])))
    }

    async fn predict_video(
        &self,
        request: DetectionRequest<'_>,
    ) -> Result<Box<dyn FrameSource>, JobError> {
        self.record(&request)?;
        Ok(Box::new(FakeFrames {
            total: self.frames,
            produced: 0,
            size: self.frame_size,
            cancel_after: self.cancel_after.clone(),
            fail_at: self.fail_at,
            pulled: Arc::clone(&self.pulled),
        }))
    }
}

struct FakeFrames {
    total: usize,
    produced: usize,
    size: (u32, u32),
    cancel_after: Option<(usize, CancellationToken)>,
    fail_at: Option<usize>,
    pulled: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, JobError> {
        if self.produced == self.total {
            return Ok(None);
        }
        self.produced += 1;
        self.pulled.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(self.produced) {
            return Err(JobError::ExternalTool {
                tool: "detector",
                exit_code: Some(1),
                message: "CUDA out of memory".into(),
            });
        }
        if let Some((frame, token)) = &self.cancel_after {
            if *frame == self.produced {
                token.cancel();
            }
        }
        let (w, h) = self.size;
        Ok(Some(RgbImage::from_pixel(w, h, Rgb([0, 255, 0]))))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct QueueEntry {
    kind: String,
    params: serde_json::Value,
    status: JobStatus,
    cancel_requested: bool,
    worker: Option<String>,
    heartbeat: Option<Instant>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<JobId>,
    jobs: HashMap<JobId, QueueEntry>,
}

/// [`JobQueue`] creating owning records in a [`MemoryRecordStore`].
pub struct MemoryJobQueue {
    store: Arc<MemoryRecordStore>,
    state: Mutex<QueueState>,
}

impl MemoryJobQueue {
    pub fn new(store: Arc<MemoryRecordStore>) -> Self {
        Self {
            store,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Queue an entry verbatim, bypassing validation and record creation.
    pub fn push_raw(&self, kind: &str, params: serde_json::Value) -> JobId {
        let id = Uuid::new_v4();
        let mut state = lock(&self.state);
        state.jobs.insert(
            id,
            QueueEntry {
                kind: kind.to_string(),
                params,
                status: JobStatus::Pending,
                cancel_requested: false,
                worker: None,
                heartbeat: None,
            },
        );
        state.pending.push_back(id);
        id
    }

    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        lock(&self.state).jobs.get(&job_id).map(|e| e.status)
    }

    pub fn worker_of(&self, job_id: JobId) -> Option<String> {
        lock(&self.state).jobs.get(&job_id).and_then(|e| e.worker.clone())
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Pretend the claiming worker last signalled `age` ago.
    pub fn age_heartbeat(&self, job_id: JobId, age: Duration) {
        if let Some(entry) = lock(&self.state).jobs.get_mut(&job_id) {
            entry.heartbeat = Instant::now().checked_sub(age);
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, params: &JobParams) -> Result<JobId, JobError> {
        params.validate()?;
        let id = Uuid::new_v4();
        match params {
            JobParams::ConvertVideo(p) => {
                if !self.store.stamp_media_job(p.media_id, id) {
                    return Err(JobError::not_found("media", p.media_id));
                }
            }
            JobParams::RunImageInference(p) | JobParams::RunVideoInference(p) => {
                if self.store.media(p.media_id).is_none() || !self.store.has_model(p.model_id) {
                    return Err(JobError::not_found(
                        "media or detection model",
                        format!("{}/{}", p.media_id, p.model_id),
                    ));
                }
                self.store.insert_task(id, params.kind(), p.media_id, p.model_id);
            }
        }

        let mut state = lock(&self.state);
        state.jobs.insert(
            id,
            QueueEntry {
                kind: params.kind().as_str().to_string(),
                params: params.to_json(),
                status: JobStatus::Pending,
                cancel_requested: false,
                worker: None,
                heartbeat: None,
            },
        );
        state.pending.push_back(id);
        Ok(id)
    }

    async fn claim_next(&self, worker: &str) -> Result<Option<ClaimedJob>, JobError> {
        let mut state = lock(&self.state);
        while let Some(id) = state.pending.pop_front() {
            let Some(entry) = state.jobs.get_mut(&id) else {
                continue;
            };
            if entry.status != JobStatus::Pending {
                continue;
            }
            entry.status = JobStatus::Running;
            entry.worker = Some(worker.to_string());
            entry.heartbeat = Some(Instant::now());
            return Ok(Some(ClaimedJob {
                id,
                kind: entry.kind.clone(),
                params: entry.params.clone(),
                cancel_requested: entry.cancel_requested,
            }));
        }
        Ok(None)
    }

    async fn complete(&self, job_id: JobId, status: JobStatus) -> Result<(), JobError> {
        let mut state = lock(&self.state);
        let entry = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| JobError::not_found("queued job", job_id))?;
        entry.status = status;
        Ok(())
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<bool, JobError> {
        let mut state = lock(&self.state);
        match state.jobs.get_mut(&job_id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool, JobError> {
        lock(&self.state)
            .jobs
            .get(&job_id)
            .map(|e| e.cancel_requested)
            .ok_or_else(|| JobError::not_found("queued job", job_id))
    }

    async fn heartbeat(&self, job_id: JobId) -> Result<(), JobError> {
        if let Some(entry) = lock(&self.state).jobs.get_mut(&job_id) {
            if entry.status == JobStatus::Running {
                entry.heartbeat = Some(Instant::now());
            }
        }
        Ok(())
    }

    async fn requeue_stale(&self, lease: Duration) -> Result<Vec<JobId>, JobError> {
        let requeued: Vec<JobId> = {
            let mut state = lock(&self.state);
            let QueueState { pending, jobs } = &mut *state;
            let mut ids = Vec::new();
            for (id, entry) in jobs.iter_mut() {
                let stale = entry.heartbeat.map_or(true, |at| at.elapsed() >= lease);
                if entry.status == JobStatus::Running && stale {
                    entry.status = JobStatus::Pending;
                    entry.worker = None;
                    entry.heartbeat = None;
                    pending.push_back(*id);
                    ids.push(*id);
                }
            }
            ids
        };
        for id in &requeued {
            self.store.reset_job(*id);
        }
        Ok(requeued)
    }
}
