//! Session controller: one conversion attempt at a time, with an elapsed
//! ticker, cooperative cancellation and explicit retry.
//!
//! ## State machine
//!
//! ```text
//! Idle ──select_image──▶ Running ──completion──▶ Succeeded | Failed
//!                           │
//!                           └──────cancel──────▶ Cancelled
//!
//! any terminal state ──select_image / retry──▶ Running (new attempt)
//! ```
//!
//! ## Cancellation
//!
//! Cancelling does not abort the in-flight service call. Every attempt has a
//! number; the pipeline task commits its result only if its number is still
//! current and the status is still `Running`. A late success or failure from
//! a cancelled or superseded attempt is dropped on the floor.
//!
//! Each attempt also owns a [`CancellationToken`] that stops its 1 Hz
//! ticker. The token is cancelled on every exit from `Running`: completion,
//! cancel, supersession and drop.
//!
//! State is published through a [`tokio::sync::watch`] channel so front ends
//! can render progress without polling.

use crate::config::{ConversionOptions, ConverterConfig};
use crate::convert::convert;
use crate::error::Image2HtmlError;
use crate::output::HtmlFragment;
use crate::pipeline::input::ImageAsset;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suffix appended to every failure message shown to the user.
pub const RETRY_SUFFIX: &str = " Please try again later.";

/// Elapsed-time tick period.
const TICK: Duration = Duration::from_secs(1);

/// Lifecycle of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Idle,
    Running,
    Cancelled,
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::Cancelled | AttemptStatus::Succeeded | AttemptStatus::Failed
        )
    }
}

/// Observable session state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: AttemptStatus,
    /// Attempt number, incremented on every start. 0 before the first.
    pub attempt: u64,
    /// Whole seconds spent in `Running` during this attempt.
    pub elapsed_secs: u64,
    /// Generated fragment, set only when `Succeeded`.
    pub html: Option<HtmlFragment>,
    /// User-facing message, set when `Failed` or `Cancelled`.
    pub message: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: AttemptStatus::Idle,
            attempt: 0,
            elapsed_secs: 0,
            html: None,
            message: None,
        }
    }
}

struct Control {
    image: Option<ImageAsset>,
    options: ConversionOptions,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Drives conversion attempts for one image at a time.
///
/// Must be used from within a Tokio runtime: starting an attempt spawns the
/// pipeline and ticker tasks.
///
/// # Example
/// ```rust,no_run
/// use image2html::{ConversionOptions, ConverterConfig, ImageAsset, Session};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::new(ConverterConfig::default(), ConversionOptions::default());
/// session.select_image(ImageAsset::new(std::fs::read("mock.png")?, "image/png")?);
/// session.wait().await;
/// let snap = session.snapshot();
/// println!("{:?} after {}s", snap.status, snap.elapsed_secs);
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: Arc<ConverterConfig>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    control: Mutex<Control>,
}

impl Session {
    pub fn new(config: ConverterConfig, options: ConversionOptions) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            config: Arc::new(config),
            state: Arc::new(tx),
            control: Mutex::new(Control {
                image: None,
                options,
                stop: None,
                task: None,
            }),
        }
    }

    /// Hold `image` and start converting it with the current options.
    ///
    /// An attempt still running is superseded; its result will be discarded.
    pub fn select_image(&self, image: ImageAsset) {
        let mut control = self.lock();
        control.image = Some(image);
        self.start_attempt(&mut control);
    }

    /// Re-run the held image with the current options.
    ///
    /// Returns `false` (and does nothing) when no image is held or an
    /// attempt is still running.
    pub fn retry(&self) -> bool {
        let mut control = self.lock();
        if control.image.is_none() {
            debug!("Retry ignored: no image selected");
            return false;
        }
        if self.state.borrow().status == AttemptStatus::Running {
            debug!("Retry ignored: attempt still running");
            return false;
        }
        self.start_attempt(&mut control);
        true
    }

    /// Cancel the running attempt.
    ///
    /// Returns `false` when nothing is running. The in-flight call keeps
    /// going, but its result will never be committed.
    pub fn cancel(&self) -> bool {
        let mut control = self.lock();
        let cancelled = self.state.send_if_modified(|s| {
            if s.status != AttemptStatus::Running {
                return false;
            }
            s.status = AttemptStatus::Cancelled;
            s.html = None;
            s.message = Some(Image2HtmlError::Cancelled.to_string());
            true
        });

        if cancelled {
            if let Some(stop) = control.stop.take() {
                stop.cancel();
            }
            info!("Attempt {} cancelled by user", self.state.borrow().attempt);
        }
        cancelled
    }

    /// Replace the options used by the next attempt.
    pub fn set_options(&self, options: ConversionOptions) {
        self.lock().options = options;
    }

    pub fn options(&self) -> ConversionOptions {
        self.lock().options.clone()
    }

    /// The held image, if any.
    pub fn image(&self) -> Option<ImageAsset> {
        self.lock().image.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change (including elapsed ticks).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Snapshots of the current attempt until it settles.
    ///
    /// Yields the current snapshot first, then one per change (including
    /// every elapsed tick), and ends after the first terminal or `Idle`
    /// snapshot. A superseding `select_image` keeps the stream going with
    /// the new attempt.
    pub fn updates(&self) -> impl Stream<Item = SessionSnapshot> + Send + 'static {
        let rx = self.state.subscribe();
        stream::unfold((rx, true, false), |(mut rx, first, done)| async move {
            if done {
                return None;
            }
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snap = rx.borrow_and_update().clone();
            let settled = snap.status != AttemptStatus::Running;
            Some((snap, (rx, false, settled)))
        })
    }

    /// Wait for the most recently started pipeline task to finish.
    ///
    /// After a cancel this still waits for the abandoned call to return;
    /// the state will nonetheless stay `Cancelled`.
    pub async fn wait(&self) {
        let task = self.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Conversion task ended abnormally: {e}");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_attempt(&self, control: &mut Control) {
        let Some(image) = control.image.clone() else {
            return;
        };
        let options = control.options.clone();

        if let Some(previous) = control.stop.take() {
            debug!("Superseding running attempt");
            previous.cancel();
        }

        let mut attempt = 0;
        self.state.send_modify(|s| {
            s.attempt += 1;
            attempt = s.attempt;
            s.status = AttemptStatus::Running;
            s.elapsed_secs = 0;
            s.html = None;
            s.message = None;
        });
        info!("Attempt {} started ({} bytes)", attempt, image.len());

        let stop = CancellationToken::new();
        tokio::spawn(run_ticker(Arc::clone(&self.state), attempt, stop.clone()));

        let state = Arc::clone(&self.state);
        let config = Arc::clone(&self.config);
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            let result = convert(&image, &options, &config).await;
            commit_result(&state, attempt, result);
            task_stop.cancel();
        });

        control.stop = Some(stop);
        control.task = Some(task);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let control = self
            .control
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(stop) = control.stop.take() {
            stop.cancel();
        }
    }
}

/// User-facing failure text: error description plus [`RETRY_SUFFIX`].
pub fn failure_message(error: &Image2HtmlError) -> String {
    format!("{error}{RETRY_SUFFIX}")
}

/// Commit a pipeline result if `attempt` is still the running attempt.
fn commit_result(
    state: &watch::Sender<SessionSnapshot>,
    attempt: u64,
    result: Result<HtmlFragment, Image2HtmlError>,
) {
    let committed = state.send_if_modified(|s| {
        if s.attempt != attempt || s.status != AttemptStatus::Running {
            return false;
        }
        match result {
            Ok(html) => {
                s.status = AttemptStatus::Succeeded;
                s.html = Some(html);
                s.message = None;
            }
            Err(ref e) => {
                s.status = AttemptStatus::Failed;
                s.html = None;
                s.message = Some(failure_message(e));
            }
        }
        true
    });

    if committed {
        info!("Attempt {} finished: {:?}", attempt, state.borrow().status);
    } else {
        debug!("Discarding stale result of attempt {}", attempt);
    }
}

/// Increment `elapsed_secs` once per second while `attempt` is running.
async fn run_ticker(
    state: Arc<watch::Sender<SessionSnapshot>>,
    attempt: u64,
    stop: CancellationToken,
) {
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let ticked = state.send_if_modified(|s| {
                    if s.attempt == attempt && s.status == AttemptStatus::Running {
                        s.elapsed_secs += 1;
                        true
                    } else {
                        false
                    }
                });
                if !ticked {
                    break;
                }
            }
        }
    }
    debug!("Ticker for attempt {} stopped", attempt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!AttemptStatus::Idle.is_terminal());
        assert!(!AttemptStatus::Running.is_terminal());
        assert!(AttemptStatus::Cancelled.is_terminal());
        assert!(AttemptStatus::Succeeded.is_terminal());
        assert!(AttemptStatus::Failed.is_terminal());
    }

    #[test]
    fn failure_message_appends_suffix() {
        let msg = failure_message(&Image2HtmlError::generation("boom"));
        assert_eq!(
            msg,
            "Failed to communicate with the generation service. Please try again later."
        );
    }

    fn running(attempt: u64) -> watch::Sender<SessionSnapshot> {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            status: AttemptStatus::Running,
            attempt,
            ..SessionSnapshot::default()
        });
        tx
    }

    #[test]
    fn commit_ignores_stale_attempt() {
        let tx = running(2);
        commit_result(&tx, 1, Ok(HtmlFragment::from_model_output("<p>old</p>")));
        assert_eq!(tx.borrow().status, AttemptStatus::Running);
        assert!(tx.borrow().html.is_none());
    }

    #[test]
    fn commit_success_and_failure() {
        let tx = running(1);
        commit_result(&tx, 1, Ok(HtmlFragment::from_model_output("<p>ok</p>")));
        assert_eq!(tx.borrow().status, AttemptStatus::Succeeded);
        assert_eq!(tx.borrow().html.as_ref().unwrap().as_str(), "<p>ok</p>");

        let tx = running(1);
        commit_result(&tx, 1, Err(Image2HtmlError::generation("x")));
        assert_eq!(tx.borrow().status, AttemptStatus::Failed);
        assert!(tx.borrow().message.as_deref().unwrap().ends_with(RETRY_SUFFIX));
    }

    #[test]
    fn commit_ignores_cancelled_attempt() {
        let tx = running(1);
        tx.send_modify(|s| s.status = AttemptStatus::Cancelled);
        commit_result(&tx, 1, Ok(HtmlFragment::from_model_output("<p>late</p>")));
        assert_eq!(tx.borrow().status, AttemptStatus::Cancelled);
        assert!(tx.borrow().html.is_none());
    }
}
