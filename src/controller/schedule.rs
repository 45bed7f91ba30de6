//! Periodic refresh timer.
//!
//! One named thread waits on a cancel channel with the interval as timeout; every
//! timeout triggers a rebuild through a weak controller handle. `stop()` signals the
//! channel and joins the thread, so once it returns no further rebuild can start.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

use super::ContentCacheController;

pub(crate) struct RefreshTimer {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl RefreshTimer {
    pub fn start(interval: Duration, controller: Weak<ContentCacheController>) -> Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("cache-refresh".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(ctl) = controller.upgrade() else {
                            debug!("refresh timer: controller dropped, exiting");
                            break;
                        };
                        debug!("refresh timer fired");
                        if let Err(e) = ctl.rebuild_from_datasource() {
                            warn!("periodic cache refresh failed: {}", e);
                        }
                    }
                    // cancelled or sender dropped
                    _ => break,
                }
            })
            .context("spawn cache refresh thread")?;
        info!("cache refresh timer started (every {:?})", interval);
        Ok(Self {
            cancel: Some(tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal without waiting.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.try_send(());
        }
    }

    /// Signal and wait for the thread; a rebuild in progress finishes first.
    pub fn stop(&mut self) {
        self.cancel();
        if let Some(h) = self.handle.take() {
            if h.thread().id() == thread::current().id() {
                return;
            }
            if h.join().is_err() {
                warn!("cache refresh thread panicked");
            }
            info!("cache refresh timer stopped");
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        // no join here: the last controller handle may be dropped on the timer thread itself
        self.cancel();
    }
}
