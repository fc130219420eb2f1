//! Text recognition on plate patches
//!
//! Recognition is the only truly asynchronous step of the pipeline. The
//! `RecognitionWorker` runs the recognizer on its own thread and allows a
//! single outstanding request: a patch offered while one is in flight is
//! refused, not queued.

use crossbeam_channel::{bounded, Sender, TrySendError};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by text recognizers
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("failed to initialize recognizer: {0}")]
    Init(String),
    #[error("failed to prepare patch: {0}")]
    Image(String),
    #[error("recognition failed: {0}")]
    Engine(String),
    #[error("recognizer exhausted")]
    Exhausted,
}

/// Reads the text on a preprocessed plate patch
pub trait TextRecognizer: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn recognize(&mut self, patch: &GrayImage) -> Result<String, RecognitionError>;
}

/// Which recognizer backend to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerBackend {
    /// No recognition, localization only
    #[default]
    Disabled,
    /// Replay recorded readings from a transcript
    Replay,
    /// Tesseract via leptess (`tesseract` feature)
    Tesseract,
}

/// Recognition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub backend: RecognizerBackend,
    /// Transcript for the replay backend, one reading per line
    pub transcript: Option<PathBuf>,
    /// Tesseract language
    pub language: String,
    /// Characters Tesseract may emit
    pub char_whitelist: String,
    /// Patch preprocessing before recognition
    pub preprocessing: super::preprocess::PatchPreprocessing,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Disabled,
            transcript: None,
            language: "eng".to_string(),
            char_whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            preprocessing: Default::default(),
        }
    }
}

/// A patch submitted for recognition
#[derive(Debug, Clone)]
pub struct RecognitionJob {
    /// Sequence of the frame the patch was cut from
    pub sequence: u64,
    pub patch: GrayImage,
}

/// Completion of a recognition job, delivered exactly once per job
#[derive(Debug)]
pub struct RecognitionOutcome {
    pub sequence: u64,
    pub result: Result<String, RecognitionError>,
    pub elapsed: Duration,
}

/// Background recognition thread with a single outstanding request
pub struct RecognitionWorker {
    job_tx: Option<Sender<RecognitionJob>>,
    in_flight: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RecognitionWorker {
    /// Spawn the worker; `on_complete` runs on the worker thread after each job
    pub fn spawn<F>(mut recognizer: Box<dyn TextRecognizer>, mut on_complete: F) -> std::io::Result<Self>
    where
        F: FnMut(RecognitionOutcome) + Send + 'static,
    {
        let (job_tx, job_rx) = bounded::<RecognitionJob>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let flag = in_flight.clone();

        let thread = std::thread::Builder::new()
            .name("recognition".to_string())
            .spawn(move || {
                info!("Recognition worker using {}", recognizer.name());
                for job in job_rx.iter() {
                    let start = Instant::now();
                    let result = recognizer.recognize(&job.patch);
                    let elapsed = start.elapsed();

                    match &result {
                        Ok(text) => debug!("Frame {} recognized {:?} in {:?}", job.sequence, text, elapsed),
                        Err(e) => warn!("Frame {} recognition failed: {}", job.sequence, e),
                    }

                    on_complete(RecognitionOutcome {
                        sequence: job.sequence,
                        result,
                        elapsed,
                    });
                    // The gate opens only after the callback has fired
                    flag.store(false, Ordering::Release);
                }
                info!("Recognition worker exiting");
            })?;

        Ok(Self {
            job_tx: Some(job_tx),
            in_flight,
            thread: Some(thread),
        })
    }

    /// Offer a job; returns false without queuing when one is outstanding
    pub fn try_submit(&self, job: RecognitionJob) -> bool {
        let Some(tx) = &self.job_tx else {
            return false;
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.in_flight.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Whether a request is outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Finish the outstanding job (if any) and stop the thread
    pub fn shutdown(&mut self) {
        self.job_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the recognizer selected in the configuration
pub fn build_recognizer(config: &RecognitionConfig) -> anyhow::Result<Option<Box<dyn TextRecognizer>>> {
    match config.backend {
        RecognizerBackend::Disabled => Ok(None),
        RecognizerBackend::Replay => {
            let path = config
                .transcript
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("replay recognizer needs a transcript file"))?;
            Ok(Some(Box::new(super::replay::ReplayRecognizer::from_file(path)?)))
        }
        #[cfg(feature = "tesseract")]
        RecognizerBackend::Tesseract => Ok(Some(Box::new(super::tesseract::TesseractRecognizer::new(
            &config.language,
            &config.char_whitelist,
        )?))),
        #[cfg(not(feature = "tesseract"))]
        RecognizerBackend::Tesseract => Err(anyhow::anyhow!(
            "Tesseract backend not compiled in, rebuild with --features tesseract"
        )),
    }
}
