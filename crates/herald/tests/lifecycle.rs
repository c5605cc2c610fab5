//! Whole-lifecycle test through the public API.
//!
//! The emitter allows one `init` per process, so the full scenario lives
//! in a single test: init → messages → operation with spinner → release →
//! concurrent producers → clean end, then the terminal-state checks.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald::{Emitter, EmitterConfig, EmitterMode, SpinnerConfig, TermCaps};

/// In-memory stand-in for a terminal stream.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_full_run_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("run.log");
    let out = SharedBuf::default();
    let err = SharedBuf::default();

    let emitter = Emitter::init(
        EmitterConfig::new(EmitterMode::Brief, "lifecycle", "lifecycle 1.0")
            .log_path(&log_path)
            .caps(TermCaps {
                is_interactive: true,
                supports_color: false,
                terminal_width: 60,
            })
            .spinner(SpinnerConfig {
                interval: Duration::from_millis(5),
                threshold: Duration::from_millis(40),
            })
            .with_streams(out.clone(), err.clone()),
    )
    .unwrap();

    // A second init in the same process is a setup bug.
    let double = Emitter::init(EmitterConfig::new(
        EmitterMode::Brief,
        "lifecycle",
        "lifecycle 1.0",
    ));
    assert!(matches!(
        double,
        Err(herald::EmitterError::AlreadyInitialized)
    ));

    emitter.message("starting up").unwrap();

    // An operation with repeated identical progress and a stall long
    // enough for the spinner to kick in.
    {
        let op = emitter.begin("build").unwrap();
        for _ in 0..3 {
            op.progress("compiling", false).unwrap();
        }
        std::thread::sleep(Duration::from_millis(150));
        drop(op);
    }
    emitter.flush();
    let on_screen = err.contents();
    assert!(on_screen.contains("compiling"));
    assert!(on_screen.contains("s)"), "spinner never painted: {on_screen:?}");

    // Released: progress now fails fast, a new operation opens fine.
    assert!(emitter.progress("late", false).is_err());

    // Concurrent producers; the log must hold every record, per-thread
    // order preserved.
    let mut handles = Vec::new();
    for t in 0..4 {
        let emitter = emitter.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                emitter.message(&format!("worker{t} item{i}")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // message → flush → the record is on disk even before shutdown.
    emitter.message("almost done").unwrap();
    emitter.flush();
    let flushed = std::fs::read_to_string(&log_path).unwrap();
    assert!(flushed.contains("info almost done"));

    emitter.ended_ok().unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();

    // Greeting first, then everything else in order.
    assert!(lines[0].ends_with("info lifecycle 1.0"));
    assert!(lines[1].ends_with("info starting up"));
    // 1 operation announce + 3 progress lines, all logged despite being
    // ephemeral on screen; spinner repaints are not records.
    assert_eq!(lines.iter().filter(|l| l.contains(" progress ")).count(), 4);
    // All 100 concurrent records landed.
    assert_eq!(lines.iter().filter(|l| l.contains(" item")).count(), 100);
    for t in 0..4 {
        let ordinals: Vec<usize> = lines
            .iter()
            .filter_map(|l| {
                l.split(&format!("worker{t} item"))
                    .nth(1)
                    .map(|n| n.parse().unwrap())
            })
            .collect();
        assert_eq!(ordinals, (0..25).collect::<Vec<_>>());
    }

    // Stopped is terminal.
    assert!(emitter.message("too late").is_err());
    assert!(emitter.begin("too late").is_err());
    // But closing twice is harmless.
    emitter.ended_ok().unwrap();
}

#[test]
fn test_log_filepath_is_unique_and_rotated() {
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_STATE_HOME", tmp.path());

    let first = herald::log_filepath("rotationapp").unwrap();
    assert!(first
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("rotationapp-"));

    // Create enough fake runs to trigger rotation on the next resolve.
    let dir = first.parent().unwrap();
    for i in 0..8 {
        std::fs::write(
            dir.join(format!("rotationapp-2025010{i}-000000.000000.log")),
            b"old",
        )
        .unwrap();
    }
    let _next = herald::log_filepath("rotationapp").unwrap();
    let remaining = std::fs::read_dir(dir).unwrap().count();
    // The limit counts the file about to be created.
    assert_eq!(remaining, herald::MAX_LOG_FILES - 1);
}
