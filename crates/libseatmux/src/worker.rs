use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::shell::SettingManager;

enum Message {
    Scale(f64),
    Quit,
}

/// Cheap handle for queueing scale updates onto one session's worker.
///
/// Updates are applied on the worker thread, in the order they were sent.
/// Sending to a worker that already stopped is silently dropped; the
/// session may be tearing down while a scale change is in flight.
#[derive(Clone)]
pub struct ScaleSink {
    tx: mpsc::Sender<Message>,
}

impl ScaleSink {
    pub fn send(&self, scale: f64) {
        let _ = self.tx.send(Message::Scale(scale));
    }
}

/// Background thread applying xsettings for one session.
///
/// The thread drains its queue in order and exits on the quit message.
/// Dropping the handle requests the quit and waits for the thread, bounded
/// by the shutdown timeout; a worker stuck past the bound is detached so
/// compositor shutdown never hangs on it.
pub struct SettingWorker {
    tx: mpsc::Sender<Message>,
    done_rx: mpsc::Receiver<()>,
    thread: Option<thread::JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl SettingWorker {
    pub fn spawn(
        mut settings: Box<dyn SettingManager>,
        shutdown_timeout: Duration,
    ) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("setting-worker".into())
            .spawn(move || {
                while let Ok(Message::Scale(scale)) = rx.recv() {
                    settings.set_global_scale(scale);
                    settings.apply();
                }
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            tx,
            done_rx,
            thread: Some(thread),
            shutdown_timeout,
        })
    }

    pub fn sink(&self) -> ScaleSink {
        ScaleSink {
            tx: self.tx.clone(),
        }
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(Message::Quit);
        match self.done_rx.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                debug!("setting worker stopped");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "setting worker did not stop in time, detaching"
                );
            }
        }
    }
}

impl Drop for SettingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
