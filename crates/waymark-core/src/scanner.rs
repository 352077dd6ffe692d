//! Cancellable code-scanning task.
//!
//! The scanner owns the camera ([`FrameSource`]) and the decoder. Each poll
//! iteration first checks the cancellation flag, then pulls at most one frame
//! and tries to decode it. Between iterations [`Scanner::run`] waits one frame
//! interval, or less if the token is cancelled in the meantime.
//!
//! The camera is released as soon as a code is decoded, or inside
//! [`ScanToken::cancel`] / [`Scanner::stop`] before they return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::collaborators::{CodeDecoder, Frame, FrameSource};
use crate::config::ScannerConfig;
use crate::error::ScanError;

// =============================================================================
// Shared camera
// =============================================================================

/// Camera plus its held flag, shared between the scanner and its tokens.
struct Camera<F> {
    source: Mutex<F>,
    held: AtomicBool,
}

impl<F: FrameSource> Camera<F> {
    fn source(&self) -> MutexGuard<'_, F> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<(), ScanError> {
        let mut source = self.source();
        if self.held.load(Ordering::SeqCst) {
            return Ok(());
        }
        source.acquire()?;
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_frame(&self) -> Option<Frame> {
        self.source().next_frame()
    }
}

/// Type-erased release so a token does not carry the camera's type.
trait ReleaseCamera: Send + Sync {
    fn release(&self);
}

impl<F: FrameSource + Send> ReleaseCamera for Camera<F> {
    fn release(&self) {
        let mut source = self.source();
        if self.held.swap(false, Ordering::SeqCst) {
            source.release();
            debug!("Camera released");
        }
    }
}

// =============================================================================
// Token
// =============================================================================

/// Cancellation handle for a scanner.
///
/// Every clone controls the same scanner, including clones taken before
/// [`Scanner::start`]. `start` re-arms the token, so a cancel issued while no
/// scan is running does not carry over into the next one.
#[derive(Clone)]
pub struct ScanToken {
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
    camera: Arc<dyn ReleaseCamera>,
}

impl ScanToken {
    /// Cancel the scan and release the camera before returning.
    ///
    /// A pending [`Scanner::run`] wakes and returns [`ScanError::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.camera.release();
        self.wake.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn rearm(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ScanToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Result of one poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPoll {
    /// No code in this frame (or no frame yet); poll again next frame.
    Pending,
    /// A payload was decoded and the camera has been released.
    Decoded(String),
}

// =============================================================================
// Scanner
// =============================================================================

pub struct Scanner<F, D> {
    camera: Arc<Camera<F>>,
    decoder: D,
    frame_interval: Duration,
    token: ScanToken,
}

impl<F, D> Scanner<F, D>
where
    F: FrameSource + Send + 'static,
    D: CodeDecoder,
{
    pub fn new(source: F, decoder: D, config: &ScannerConfig) -> Self {
        let camera = Arc::new(Camera {
            source: Mutex::new(source),
            held: AtomicBool::new(false),
        });
        let token = ScanToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            camera: camera.clone(),
        };
        Self {
            camera,
            decoder,
            frame_interval: config.frame_interval(),
            token,
        }
    }

    /// Cancellation handle for this scanner.
    #[must_use]
    pub fn token(&self) -> ScanToken {
        self.token.clone()
    }

    /// Whether the camera is currently acquired.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.camera.held.load(Ordering::SeqCst)
    }

    /// Re-arm the token and acquire the camera.
    ///
    /// Calling `start` while already scanning is a no-op.
    pub fn start(&mut self) -> Result<(), ScanError> {
        if self.is_scanning() {
            return Ok(());
        }
        self.token.rearm();
        if let Err(err) = self.camera.acquire() {
            warn!(error = %err, "Camera acquisition failed");
            return Err(err);
        }
        info!("Code scanning started");
        Ok(())
    }

    /// Cancel scanning and release the camera before returning.
    pub fn stop(&mut self) {
        self.token.cancel();
    }

    /// One scan iteration.
    pub fn poll_once(&mut self) -> Result<ScanPoll, ScanError> {
        if self.token.is_cancelled() || !self.is_scanning() {
            self.camera.release();
            return Err(ScanError::Cancelled);
        }

        let Some(frame) = self.camera.next_frame() else {
            return Ok(ScanPoll::Pending);
        };

        match self.decoder.decode(&frame) {
            Some(payload) if !payload.is_empty() => {
                self.camera.release();
                info!(payload_len = payload.chars().count(), "Code decoded");
                Ok(ScanPoll::Decoded(payload))
            }
            _ => Ok(ScanPoll::Pending),
        }
    }

    /// Start scanning and poll every frame interval until a code is decoded
    /// or the token is cancelled.
    pub async fn run(&mut self) -> Result<String, ScanError> {
        self.start()?;
        loop {
            if let ScanPoll::Decoded(payload) = self.poll_once()? {
                return Ok(payload);
            }
            let woken = self.token.wake.notified();
            tokio::pin!(woken);
            // Register before re-checking the flag so a cancel in between is not lost.
            woken.as_mut().enable();
            if self.token.is_cancelled() {
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(self.frame_interval) => {}
                () = &mut woken => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct CameraLog {
        acquired: usize,
        released: usize,
        frames_read: usize,
    }

    struct FakeCamera {
        log: Arc<Mutex<CameraLog>>,
        fail: bool,
    }

    impl FakeCamera {
        fn new(log: &Arc<Mutex<CameraLog>>) -> Self {
            Self {
                log: Arc::clone(log),
                fail: false,
            }
        }
    }

    impl FrameSource for FakeCamera {
        fn acquire(&mut self) -> Result<(), ScanError> {
            if self.fail {
                return Err(ScanError::CameraUnavailable("permission denied".to_string()));
            }
            self.log.lock().unwrap().acquired += 1;
            Ok(())
        }

        fn next_frame(&mut self) -> Option<Frame> {
            self.log.lock().unwrap().frames_read += 1;
            Some(Frame::default())
        }

        fn release(&mut self) {
            self.log.lock().unwrap().released += 1;
        }
    }

    /// Returns scripted results, one per frame, then `None` forever.
    struct ScriptedDecoder(VecDeque<Option<String>>);

    impl ScriptedDecoder {
        fn after_misses(misses: usize, payload: &str) -> Self {
            let mut script: VecDeque<_> = std::iter::repeat_n(None, misses).collect();
            script.push_back(Some(payload.to_string()));
            Self(script)
        }

        fn never() -> Self {
            Self(VecDeque::new())
        }
    }

    impl CodeDecoder for ScriptedDecoder {
        fn decode(&mut self, _frame: &Frame) -> Option<String> {
            self.0.pop_front().flatten()
        }
    }

    #[test]
    fn decode_releases_camera() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::after_misses(2, "EVENT-1"),
            &ScannerConfig::default(),
        );
        scanner.start().unwrap();
        assert_eq!(scanner.poll_once().unwrap(), ScanPoll::Pending);
        assert_eq!(scanner.poll_once().unwrap(), ScanPoll::Pending);
        assert_eq!(
            scanner.poll_once().unwrap(),
            ScanPoll::Decoded("EVENT-1".to_string())
        );
        assert!(!scanner.is_scanning());
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn stop_releases_synchronously() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::never(),
            &ScannerConfig::default(),
        );
        scanner.start().unwrap();
        scanner.stop();
        assert_eq!(log.lock().unwrap().released, 1);
        assert_eq!(scanner.poll_once(), Err(ScanError::Cancelled));
        scanner.stop();
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn cancelled_token_is_checked_before_reading_a_frame() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::after_misses(0, "EVENT-1"),
            &ScannerConfig::default(),
        );
        scanner.start().unwrap();
        scanner.token().cancel();
        assert!(!scanner.is_scanning());
        assert_eq!(scanner.poll_once(), Err(ScanError::Cancelled));
        let log = log.lock().unwrap();
        assert_eq!(log.frames_read, 0);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn acquisition_failure_is_camera_unavailable() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut camera = FakeCamera::new(&log);
        camera.fail = true;
        let mut scanner = Scanner::new(camera, ScriptedDecoder::never(), &ScannerConfig::default());
        assert!(matches!(scanner.start(), Err(ScanError::CameraUnavailable(_))));
        assert!(!scanner.is_scanning());
        assert_eq!(log.lock().unwrap().released, 0);
    }

    #[test]
    fn empty_payload_keeps_scanning() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::after_misses(0, ""),
            &ScannerConfig::default(),
        );
        scanner.start().unwrap();
        assert_eq!(scanner.poll_once().unwrap(), ScanPoll::Pending);
        assert!(scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn run_yields_one_frame_interval_between_polls() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let config = ScannerConfig {
            frame_interval_ms: 20,
        };
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::after_misses(3, "EVENT-1"),
            &config,
        );
        let started = tokio::time::Instant::now();
        let payload = scanner.run().await.unwrap();
        assert_eq!(payload, "EVENT-1");
        assert_eq!(started.elapsed(), Duration::from_millis(60));
        assert_eq!(log.lock().unwrap().frames_read, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_token_is_cancelled_elsewhere() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::never(),
            &ScannerConfig::default(),
        );
        scanner.start().unwrap();
        let token = scanner.token();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let result = scanner.run().await;
        canceller.await.unwrap();
        assert_eq!(result, Err(ScanError::Cancelled));
        assert!(!scanner.is_scanning());
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_another_task_releases_camera_immediately() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let config = ScannerConfig {
            frame_interval_ms: 1000,
        };
        let mut scanner = Scanner::new(FakeCamera::new(&log), ScriptedDecoder::never(), &config);
        // Taken before `run` arms the scan.
        let token = scanner.token();
        let canceller_log = Arc::clone(&log);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
            canceller_log.lock().unwrap().released
        });

        let started = tokio::time::Instant::now();
        let result = scanner.run().await;
        let released_when_cancel_returned = canceller.await.unwrap();

        assert_eq!(released_when_cancel_returned, 1);
        assert_eq!(result, Err(ScanError::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(log.lock().unwrap().released, 1);
        assert_eq!(log.lock().unwrap().frames_read, 1);
    }

    #[test]
    fn restart_after_cancel_rearms_existing_tokens() {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let mut scanner = Scanner::new(
            FakeCamera::new(&log),
            ScriptedDecoder::never(),
            &ScannerConfig::default(),
        );
        let token = scanner.token();
        scanner.start().unwrap();
        token.cancel();
        assert_eq!(scanner.poll_once(), Err(ScanError::Cancelled));

        scanner.start().unwrap();
        assert!(!token.is_cancelled());
        assert_eq!(scanner.poll_once().unwrap(), ScanPoll::Pending);
        token.cancel();
        assert!(!scanner.is_scanning());
        let log = log.lock().unwrap();
        assert_eq!(log.acquired, 2);
        assert_eq!(log.released, 2);
    }
}
