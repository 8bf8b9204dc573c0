use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Receives the frame timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// The host's animation-frame primitive. Callbacks requested during a frame
/// run on the following one.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback);
}

pub const DISPLAY_REFRESH_MS: f64 = 1000.0 / 60.0;

/// Scheduler driven explicitly by the host loop (or a test).
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<Vec<FrameCallback>>,
    clock_ms: Cell<f64>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs every callback queued before this call at `timestamp_ms`.
    pub fn run_frame(&self, timestamp_ms: f64) -> usize {
        self.clock_ms.set(timestamp_ms);
        let batch = std::mem::take(&mut *self.queue.borrow_mut());
        let ran = batch.len();
        for callback in batch {
            callback(timestamp_ms);
        }
        ran
    }

    /// Advances the clock by one display refresh and runs a frame.
    pub fn tick(&self) -> usize {
        self.run_frame(self.clock_ms.get() + DISPLAY_REFRESH_MS)
    }

    pub fn run_frames(&self, n: usize) -> usize {
        (0..n).map(|_| self.tick()).sum()
    }

    pub fn now_ms(&self) -> f64 {
        self.clock_ms.get()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        self.queue.borrow_mut().push(callback);
    }
}
