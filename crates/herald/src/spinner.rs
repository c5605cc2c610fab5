//! Spinner session and the timer-driven controller.
//!
//! The controller runs only while an operation is ongoing and the terminal
//! is interactive. It never writes to the terminal: each tick it may enqueue
//! one repaint instruction into the writer queue, which keeps spinner output
//! totally ordered with every other emission. Cancellation is observed on
//! the next tick, so stopping latency is bounded by the tick interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::printer::RenderInstr;
use crate::theme::SPINNER_GLYPHS;

/// Tunable timing for the "still working" indicator. Not part of the
/// output contract; applications may slow it down or speed it up.
#[derive(Debug, Clone, Copy)]
pub struct SpinnerConfig {
    /// How often the controller wakes up to check the session.
    pub interval: Duration,
    /// How long the progress text must stay unchanged before spinning.
    pub threshold: Duration,
}

impl Default for SpinnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            threshold: Duration::from_secs(2),
        }
    }
}

/// Per-operation progress indicator state, owned by the ongoing operation
/// and shared with its controller thread.
#[derive(Debug)]
pub(crate) struct SpinnerSession {
    /// Current progress text (kept for diagnostics; the writer repaints
    /// from its own previous-line state).
    text: Mutex<String>,
    /// When the text last changed; the spinner activates only after the
    /// threshold has elapsed since this instant.
    last_update: Mutex<Instant>,
    /// Monotonically increasing repaint counter, also the glyph index.
    repaints: AtomicU64,
    /// The only cross-thread stop signal besides the queue itself.
    cancelled: AtomicBool,
}

impl SpinnerSession {
    pub(crate) fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(text.into()),
            last_update: Mutex::new(Instant::now()),
            repaints: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Record fresh progress text; resets the still-working countdown.
    pub(crate) fn touch(&self, text: &str) {
        if let Ok(mut current) = self.text.lock() {
            current.clear();
            current.push_str(text);
        }
        if let Ok(mut at) = self.last_update.lock() {
            *at = Instant::now();
        }
    }

    /// Reset the countdown without changing the text (bar advances).
    pub(crate) fn keep_alive(&self) {
        if let Ok(mut at) = self.last_update.lock() {
            *at = Instant::now();
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// How many repaint instructions this session has produced.
    pub(crate) fn repaint_count(&self) -> u64 {
        self.repaints.load(Ordering::SeqCst)
    }

    fn since_last_update(&self) -> Duration {
        self.last_update
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    fn next_glyph(&self) -> char {
        let n = self.repaints.fetch_add(1, Ordering::SeqCst);
        SPINNER_GLYPHS[(n as usize) % SPINNER_GLYPHS.len()]
    }

    #[cfg(test)]
    pub(crate) fn current_text(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// Spawn the controller thread for one operation.
///
/// Ticks at `config.interval`; once the session text has been stable for
/// `config.threshold` it enqueues one spinner repaint per tick, with the
/// elapsed time since the text last changed. On cancellation it enqueues a
/// clearing instruction (if it had been spinning) and exits.
pub(crate) fn spawn_controller(
    session: Arc<SpinnerSession>,
    tx: SyncSender<RenderInstr>,
    config: SpinnerConfig,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut spinning = false;
        loop {
            std::thread::sleep(config.interval);
            if session.is_cancelled() {
                if spinning {
                    let _ = tx.send(RenderInstr::SpinClear);
                }
                return;
            }
            let stale_for = session.since_last_update();
            if stale_for >= config.threshold {
                let glyph = session.next_glyph();
                if tx
                    .send(RenderInstr::Spin {
                        glyph,
                        elapsed: stale_for,
                    })
                    .is_err()
                {
                    return;
                }
                spinning = true;
            } else if spinning {
                // Fresh text arrived; the new render already replaced the
                // spun line, so just leave the spinning state.
                spinning = false;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn fast_config() -> SpinnerConfig {
        SpinnerConfig {
            interval: Duration::from_millis(5),
            threshold: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_session_touch_updates_text_and_countdown() {
        let session = SpinnerSession::new("starting");
        assert_eq!(session.current_text(), "starting");
        session.touch("halfway");
        assert_eq!(session.current_text(), "halfway");
        assert!(session.since_last_update() < Duration::from_secs(1));
    }

    #[test]
    fn test_controller_spins_only_after_threshold() {
        let session = SpinnerSession::new("compiling");
        let (tx, rx) = mpsc::sync_channel(64);
        let handle = spawn_controller(Arc::clone(&session), tx, fast_config());

        // Inside the threshold: no repaints yet.
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(session.repaint_count(), 0);

        // Past the threshold: repaints start flowing.
        std::thread::sleep(Duration::from_millis(150));
        assert!(session.repaint_count() >= 1);
        let first = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(first, RenderInstr::Spin { .. }));

        session.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_controller_clears_after_cancel_when_spinning() {
        let session = SpinnerSession::new("compiling");
        let (tx, rx) = mpsc::sync_channel(64);
        let handle = spawn_controller(Arc::clone(&session), tx, fast_config());

        std::thread::sleep(Duration::from_millis(150));
        session.cancel();
        handle.join().unwrap();

        let instrs: Vec<RenderInstr> = rx.try_iter().collect();
        assert!(!instrs.is_empty());
        assert!(matches!(instrs.last().unwrap(), RenderInstr::SpinClear));
        for instr in &instrs[..instrs.len() - 1] {
            assert!(matches!(instr, RenderInstr::Spin { .. }));
        }
    }

    #[test]
    fn test_controller_exits_quietly_when_never_spun() {
        let session = SpinnerSession::new("quick step");
        let (tx, rx) = mpsc::sync_channel(64);
        let handle = spawn_controller(Arc::clone(&session), tx, fast_config());

        session.cancel();
        handle.join().unwrap();
        assert!(rx.try_iter().next().is_none());
        assert_eq!(session.repaint_count(), 0);
    }

    #[test]
    fn test_glyphs_cycle_in_order() {
        let session = SpinnerSession::new("x");
        assert_eq!(session.next_glyph(), '-');
        assert_eq!(session.next_glyph(), '\\');
        assert_eq!(session.next_glyph(), '|');
        assert_eq!(session.next_glyph(), '/');
        assert_eq!(session.next_glyph(), '-');
        assert_eq!(session.repaint_count(), 5);
    }
}
