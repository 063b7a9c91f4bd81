use crate::config::TimingConfig;
use crate::error::{HarvestError, Result};
use crate::page::Clock;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
}

/// Sending side of the run controls; cheap to clone into signal handlers.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: UnboundedSender<Command>,
}

impl ControlHandle {
    pub fn send(&self, command: Command) {
        // A finished run has dropped its receiver; nothing left to control.
        let _ = self.tx.send(command);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }
}

/// Receiving side, owned by the run and drained at every poll tick.
#[derive(Debug)]
pub struct Controls {
    rx: UnboundedReceiver<Command>,
    paused: bool,
    stopped: bool,
}

impl Controls {
    pub fn channel() -> (ControlHandle, Controls) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ControlHandle { tx },
            Controls {
                rx,
                paused: false,
                stopped: false,
            },
        )
    }

    /// Applies pending commands and fails with `Cancelled` once a stop arrived.
    pub fn checkpoint(&mut self) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(Command::Pause) => self.paused = true,
                Ok(Command::Resume) => self.paused = false,
                Ok(Command::Stop) => self.stopped = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        if self.stopped {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Holds the caller while paused. Returns whether it actually waited.
    pub async fn pause_gate(&mut self, clock: &dyn Clock, tick: Duration) -> Result<bool> {
        self.checkpoint()?;
        let mut waited = false;
        while self.paused {
            waited = true;
            clock.sleep(tick).await;
            self.checkpoint()?;
        }
        Ok(waited)
    }
}

/// Every wait of a run, derived from the operator's inter-item delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    pub open_settle: Duration,
    pub detail_timeout: Duration,
    pub section_settle: Duration,
    pub close_step_timeout: Duration,
    pub close_settle: Duration,
    pub page_settle: Duration,
    pub poll: Duration,
}

impl Delays {
    pub fn from_inter_item(inter_item_ms: u64, poll_ms: u64) -> Self {
        let ms = Duration::from_millis;
        Self {
            open_settle: ms(inter_item_ms),
            detail_timeout: ms(inter_item_ms.saturating_mul(4)),
            section_settle: ms(inter_item_ms.saturating_mul(3) / 5),
            close_step_timeout: ms(inter_item_ms.saturating_mul(3) / 4),
            close_settle: ms(inter_item_ms / 4),
            page_settle: ms(inter_item_ms),
            poll: ms(poll_ms.max(1)),
        }
    }

    /// Derived delays with any explicit overrides from the configuration applied.
    pub fn from_config(timing: &TimingConfig, inter_item_ms: u64) -> Self {
        let mut delays = Self::from_inter_item(inter_item_ms, timing.poll_interval_ms);
        let ms = Duration::from_millis;
        if let Some(timeout) = timing.detail_timeout_ms {
            delays.detail_timeout = ms(timeout);
        }
        if let Some(settle) = timing.section_settle_ms {
            delays.section_settle = ms(settle);
        }
        if let Some(timeout) = timing.close_step_timeout_ms {
            delays.close_step_timeout = ms(timeout);
        }
        if let Some(settle) = timing.page_settle_ms {
            delays.page_settle = ms(settle);
        }
        delays
    }
}
