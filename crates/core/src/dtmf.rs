//! Per-session DTMF digit aggregator.
//!
//! A FIFO plus a restartable timer: digits accumulate until either the
//! configured code length is reached or the timer expires, at which point
//! the queue is interpreted as one command and always cleared.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtmfCommand {
    SetVideoFloor,
    SetLayoutType(u32),
    ToggleSubtitleGlobal,
    ToggleSubtitlePerMedia,
}

/// Receives interpreted DTMF commands. Implemented by whatever owns the
/// session (so it can reach the room's floor/layout and the media unit's
/// subtitle flags).
#[async_trait]
pub trait DtmfSink: Send + Sync {
    async fn set_video_floor(&self);
    async fn set_layout_type(&self, layout_id: u32);
    async fn toggle_subtitle(&self, per_media: bool);
}

fn interpret(code: &[char]) -> Option<DtmfCommand> {
    let (cmd, arg) = code.split_first()?;
    let arg: String = arg.iter().collect();
    match cmd {
        '*' => Some(match arg.as_str() {
            "3" => DtmfCommand::ToggleSubtitleGlobal,
            "4" => DtmfCommand::ToggleSubtitlePerMedia,
            _ => DtmfCommand::SetVideoFloor,
        }),
        '#' => arg.parse::<u32>().ok().map(DtmfCommand::SetLayoutType),
        _ => {
            warn!(?code, "unknown DTMF command, discarding");
            None
        }
    }
}

struct State {
    queue: Vec<char>,
    active: bool,
}

pub struct DtmfAggregator {
    state: Mutex<State>,
    generation: AtomicU64,
    timeout: Duration,
    code_length: usize,
    sink: Arc<dyn DtmfSink>,
}

impl DtmfAggregator {
    pub fn new(timeout: Duration, code_length: usize, sink: Arc<dyn DtmfSink>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State { queue: Vec::new(), active: false }),
            generation: AtomicU64::new(0),
            timeout,
            code_length: code_length.max(1),
            sink,
        })
    }

    /// Feeds one DTMF digit into the aggregator.
    pub async fn on_digit(self: &Arc<Self>, digit: char) {
        let should_flush_now;
        {
            let mut state = self.state.lock().await;
            if !state.active {
                state.queue.clear();
                state.active = true;
            }
            state.queue.push(digit);
            should_flush_now = state.queue.len() >= self.code_length;
        }

        if should_flush_now {
            self.flush().await;
        } else {
            self.restart_timer();
        }
    }

    fn restart_timer(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if this.generation.load(Ordering::SeqCst) == generation {
                this.flush().await;
            }
        });
    }

    /// Interprets the accumulated queue as one command, dispatches it, and
    /// always clears queue and timer state.
    async fn flush(self: &Arc<Self>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let code = {
            let mut state = self.state.lock().await;
            state.active = false;
            std::mem::take(&mut state.queue)
        };
        if code.is_empty() {
            return;
        }

        match interpret(&code) {
            Some(DtmfCommand::SetVideoFloor) => {
                debug!(?code, "dtmf: set video floor");
                self.sink.set_video_floor().await;
            }
            Some(DtmfCommand::SetLayoutType(layout_id)) => {
                debug!(?code, layout_id, "dtmf: set layout type");
                self.sink.set_layout_type(layout_id).await;
            }
            Some(DtmfCommand::ToggleSubtitleGlobal) => {
                debug!(?code, "dtmf: toggle subtitle (global)");
                self.sink.toggle_subtitle(false).await;
            }
            Some(DtmfCommand::ToggleSubtitlePerMedia) => {
                debug!(?code, "dtmf: toggle subtitle (per-media)");
                self.sink.toggle_subtitle(true).await;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct RecordingSink(mpsc::UnboundedSender<DtmfCommand>);

    #[async_trait]
    impl DtmfSink for RecordingSink {
        async fn set_video_floor(&self) {
            let _ = self.0.send(DtmfCommand::SetVideoFloor);
        }
        async fn set_layout_type(&self, layout_id: u32) {
            let _ = self.0.send(DtmfCommand::SetLayoutType(layout_id));
        }
        async fn toggle_subtitle(&self, per_media: bool) {
            let cmd = if per_media {
                DtmfCommand::ToggleSubtitlePerMedia
            } else {
                DtmfCommand::ToggleSubtitleGlobal
            };
            let _ = self.0.send(cmd);
        }
    }

    #[tokio::test]
    async fn flushes_on_code_length() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agg = DtmfAggregator::new(Duration::from_secs(3), 2, Arc::new(RecordingSink(tx)));

        agg.on_digit('*').await;
        agg.on_digit('3').await;

        let cmd = rx.recv().await.unwrap();
        assert_eq!(cmd, DtmfCommand::ToggleSubtitleGlobal);
    }

    #[tokio::test]
    async fn restarts_after_flush() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agg = DtmfAggregator::new(Duration::from_secs(3), 2, Arc::new(RecordingSink(tx)));

        agg.on_digit('*').await;
        agg.on_digit('3').await;
        assert_eq!(rx.recv().await.unwrap(), DtmfCommand::ToggleSubtitleGlobal);

        agg.on_digit('*').await;
        // Second command is incomplete until a timeout or another digit;
        // nothing flushed yet.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn flushes_on_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agg = DtmfAggregator::new(Duration::from_millis(20), 2, Arc::new(RecordingSink(tx)));

        agg.on_digit('*').await;
        let cmd = rx.recv().await.unwrap();
        assert_eq!(cmd, DtmfCommand::SetVideoFloor);
    }
}
