use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::lean_logic::{LeanConfig, LeanModel};

/// Per-frame loop around a [`LeanModel`]. Runs until `shutdown` or drop.
pub struct LeanEngine {
    trigger: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LeanEngine {
    /// Start the frame loop. `sampler` is polled once per frame for the
    /// current horizontal position; `on_angle` receives published angles.
    pub fn start<S, F>(config: LeanConfig, mut sampler: S, mut on_angle: F) -> Self
    where
        S: FnMut() -> f64 + Send + 'static,
        F: FnMut(f64) + Send + 'static,
    {
        let trigger = Arc::new(AtomicBool::new(false));
        let pending = Arc::clone(&trigger);

        let task = tokio::spawn(async move {
            let mut frames = tokio::time::interval(config.frame);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut model = LeanModel::new(config);
            let mut last = Instant::now();

            loop {
                frames.tick().await;
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f64();
                last = now;

                if pending.swap(false, Ordering::AcqRel) {
                    model.trigger();
                }
                if let Some(theta) = model.step(sampler(), dt) {
                    on_angle(theta);
                }
            }
        });

        Self { trigger, task }
    }

    /// Input occurred; publish on the next frame.
    pub fn trigger(&self) {
        self.trigger.store(true, Ordering::Release);
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LeanEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}
