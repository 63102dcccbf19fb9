use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use log::info;

/// Shared run progress, reported by a background thread every `interval`.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    interval: Duration,
    stage: Arc<Mutex<String>>,
    parts_done: Arc<AtomicUsize>,
    parts_total: Arc<AtomicUsize>,
    bytes_done: Arc<AtomicU64>,
    bytes_total: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    // bumped by every start; a reporter exits once it no longer matches
    generation: Arc<AtomicU64>,
    reporters: Arc<AtomicUsize>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self::with_interval(enabled, Duration::from_secs(5))
    }

    pub fn with_interval(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            stage: Arc::new(Mutex::new(String::new())),
            parts_done: Arc::new(AtomicUsize::new(0)),
            parts_total: Arc::new(AtomicUsize::new(0)),
            bytes_done: Arc::new(AtomicU64::new(0)),
            bytes_total: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            reporters: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_stage(&self, s: &str) {
        if self.enabled {
            if let Ok(mut g) = self.stage.lock() {
                *g = s.to_string();
            }
        }
    }
    pub fn set_parts_total(&self, n: usize) {
        self.parts_total.store(n, Ordering::Relaxed);
    }
    pub fn inc_part(&self) {
        self.parts_done.fetch_add(1, Ordering::Relaxed);
    }
    pub fn parts_done(&self) -> usize {
        self.parts_done.load(Ordering::Relaxed)
    }
    pub fn reset_bytes(&self, total: u64) {
        self.bytes_total.store(total, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
    }
    pub fn add_bytes(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
    }
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        if !self.enabled || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.reporters.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            let current =
                || this.running.load(Ordering::SeqCst) && this.generation.load(Ordering::SeqCst) == mine;
            while current() {
                thread::sleep(this.interval);
                if !current() {
                    break;
                }
                let s = this.stage.lock().map(|g| g.clone()).unwrap_or_default();
                let pd = this.parts_done.load(Ordering::Relaxed);
                let pt = this.parts_total.load(Ordering::Relaxed);
                let bd = this.bytes_done.load(Ordering::Relaxed);
                let bt = this.bytes_total.load(Ordering::Relaxed);
                let pct = if bt > 0 { (bd as f64 / bt as f64) * 100.0 } else { 0.0 };
                info!(
                    "[{:>4}s] {} | parts {}/{} | bytes {}%",
                    t0.elapsed().as_secs(),
                    s,
                    pd,
                    pt,
                    pct as i32
                );
            }
            this.reporters.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Reporter threads still alive. A stopped reporter may linger for up
    /// to one interval before it notices.
    pub fn reporters(&self) -> usize {
        self.reporters.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if self.enabled {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(false)
    }
}
