//! Test helpers shared by the module tests.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use traykit_native::HeadlessBackend;

use crate::config::Config;
use crate::error::Result;
use crate::runtime::TrayRuntime;

pub(crate) fn runtime() -> (TrayRuntime, Arc<HeadlessBackend>) {
    let backend = Arc::new(HeadlessBackend::new());
    let rt = TrayRuntime::with_backend(Config::default(), backend.clone());
    (rt, backend)
}

/// Polls `condition` for up to five seconds.
pub(crate) fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A message loop running on a background thread.
pub(crate) struct LoopThread {
    runtime: TrayRuntime,
    handle: Option<JoinHandle<Result<()>>>,
}

impl LoopThread {
    pub(crate) fn start(runtime: &TrayRuntime) -> Self {
        let rt = runtime.clone();
        let handle = thread::spawn(move || rt.run());
        assert!(runtime.wait_until_ready(5.0), "message loop did not start");
        Self {
            runtime: runtime.clone(),
            handle: Some(handle),
        }
    }

    pub(crate) fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.stop().unwrap();
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.runtime.stop();
            let _ = handle.join();
        }
    }
}
