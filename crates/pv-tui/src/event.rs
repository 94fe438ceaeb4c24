use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;

/// How often the dashboard re-reads the record store.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// What wakes the dashboard loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    Key(KeyEvent),
    /// The terminal changed size; redraw only.
    Resize,
    /// Time to re-read the record store.
    Refresh,
}

/// Merged stream of terminal input and refresh ticks.
pub struct Events {
    rx: mpsc::UnboundedReceiver<DashboardEvent>,
}

impl Events {
    /// Start reading the terminal on a dedicated thread and ticking every
    /// `interval`.
    pub fn start(interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let input_tx = tx.clone();
        std::thread::spawn(move || read_terminal(input_tx));
        tokio::spawn(refresh_ticks(interval, tx));
        Self { rx }
    }

    /// Wait for the next event. `None` once every source has stopped.
    pub async fn next(&mut self) -> Option<DashboardEvent> {
        self.rx.recv().await
    }
}

fn read_terminal(tx: mpsc::UnboundedSender<DashboardEvent>) {
    loop {
        let event = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => DashboardEvent::Key(key),
            Ok(Event::Resize(..)) => DashboardEvent::Resize,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "terminal input closed");
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
}

/// Send `Refresh` every `interval`, skipping missed ticks, until the
/// receiver is gone.
pub async fn refresh_ticks(interval: Duration, tx: mpsc::UnboundedSender<DashboardEvent>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick fires immediately and the caller has just refreshed
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if tx.send(DashboardEvent::Refresh).is_err() {
            return;
        }
    }
}
