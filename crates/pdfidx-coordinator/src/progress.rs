//! A typed, best-effort progress feed for a running scan/index pass.
//!
//! Each subscriber gets its own unbounded channel, so a slow consumer never
//! blocks another or the publisher. A late subscriber is replayed a
//! synthesized view of the current phase rather than either a blank feed
//! or just the single most recent event: the last `ScanCompleted`, every
//! file that finished since, and the file currently being handled along
//! with its latest progress — then live events follow. An idle subscriber
//! receives a [`ProgressEvent::Heartbeat`] every
//! [`pdfidx_core::constants::PROGRESS_HEARTBEAT_SECS`] so a long-lived
//! connection (SSE, websocket) can tell "nothing happening" apart from
//! "connection dropped".

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pdfidx_core::constants::PROGRESS_HEARTBEAT_SECS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Scanning,
    ScanCompleted { count: usize },
    StartHandlingFile { path: String, op: String },
    ParseProgress { index: usize, total: usize },
    IndexProgress { index: usize, total: usize },
    CompleteHandlingFile { path: String },
    Completed,
    Interrupting,
    Interrupted,
    Failure { message: String },
    Heartbeat,
}

struct Subscriber {
    sender: Sender<ProgressEvent>,
}

/// The three-part replay state a late subscriber is synthesized from: the
/// last completed scan, the files finished since then, and whatever file
/// is in flight right now (if any) along with its most recent progress
/// tick. A terminal outcome (`Completed`/`Interrupted`/`Failure`) for the
/// current run is tracked separately so it replays last, as the truest
/// summary of where things stand.
#[derive(Default)]
struct Phase {
    last_scan_completed: Option<ProgressEvent>,
    completed_files: Vec<String>,
    current_file: Option<(String, String)>,
    current_progress: Option<ProgressEvent>,
    terminal: Option<ProgressEvent>,
}

impl Phase {
    fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Scanning => *self = Phase::default(),
            ProgressEvent::ScanCompleted { .. } => {
                self.last_scan_completed = Some(event.clone());
                self.completed_files.clear();
                self.current_file = None;
                self.current_progress = None;
                self.terminal = None;
            }
            ProgressEvent::StartHandlingFile { path, op } => {
                self.current_file = Some((path.clone(), op.clone()));
                self.current_progress = None;
            }
            ProgressEvent::ParseProgress { .. } | ProgressEvent::IndexProgress { .. } => {
                if self.current_file.is_some() {
                    self.current_progress = Some(event.clone());
                }
            }
            ProgressEvent::CompleteHandlingFile { path } => {
                self.completed_files.push(path.clone());
                self.current_file = None;
                self.current_progress = None;
            }
            ProgressEvent::Completed | ProgressEvent::Interrupting | ProgressEvent::Interrupted | ProgressEvent::Failure { .. } => {
                self.terminal = Some(event.clone());
            }
            ProgressEvent::Heartbeat => {}
        }
    }

    fn replay_into(&self, sender: &Sender<ProgressEvent>) {
        if let Some(scan_completed) = &self.last_scan_completed {
            let _ = sender.send(scan_completed.clone());
        }
        for path in &self.completed_files {
            let _ = sender.send(ProgressEvent::CompleteHandlingFile { path: path.clone() });
        }
        if let Some((path, op)) = &self.current_file {
            let _ = sender.send(ProgressEvent::StartHandlingFile { path: path.clone(), op: op.clone() });
            if let Some(progress) = &self.current_progress {
                let _ = sender.send(progress.clone());
            }
        }
        if let Some(terminal) = &self.terminal {
            let _ = sender.send(terminal.clone());
        }
    }
}

/// Fan-out hub for [`ProgressEvent`]s. Cheap to clone via `Arc`; publishers
/// and subscribers never share a lock across a blocking send because every
/// subscriber has its own channel.
pub struct ProgressBus {
    subscribers: Mutex<Vec<Subscriber>>,
    phase: RwLock<Phase>,
    last_publish_at: Mutex<Instant>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            phase: RwLock::new(Phase::default()),
            last_publish_at: Mutex::new(Instant::now()),
        }
    }

    /// Broadcast an event. Subscribers whose receiver has been dropped are
    /// pruned on the next publish.
    pub fn publish(&self, event: ProgressEvent) {
        self.phase.write().unwrap().apply(&event);
        *self.last_publish_at.lock().unwrap() = Instant::now();
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|sub| sub.sender.send(event.clone()).is_ok());
    }

    /// Subscribe, replaying a synthesized view of the current phase so the
    /// new subscriber never lands on a blank feed mid-scan.
    pub fn subscribe(&self) -> Receiver<ProgressEvent> {
        let (sender, receiver) = channel();
        self.phase.read().unwrap().replay_into(&sender);
        self.subscribers.lock().unwrap().push(Subscriber { sender });
        receiver
    }

    fn heartbeat_if_idle(&self) {
        let mut last_publish_at = self.last_publish_at.lock().unwrap();
        if last_publish_at.elapsed() < Duration::from_secs(PROGRESS_HEARTBEAT_SECS) {
            return;
        }
        *last_publish_at = Instant::now();
        drop(last_publish_at);
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|sub| sub.sender.send(ProgressEvent::Heartbeat).is_ok());
    }
}

/// Spawn a background thread that pings idle subscribers with a heartbeat.
/// The thread exits once every `Arc<ProgressBus>` handle (including the one
/// passed in) has been dropped.
pub fn spawn_heartbeat(bus: std::sync::Arc<ProgressBus>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(Duration::from_secs(1));
            if std::sync::Arc::strong_count(&bus) == 1 {
                return;
            }
            bus.heartbeat_if_idle();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events_in_order() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe();
        bus.publish(ProgressEvent::Scanning);
        bus.publish(ProgressEvent::ScanCompleted { count: 3 });

        assert_eq!(rx.recv().unwrap(), ProgressEvent::Scanning);
        assert_eq!(rx.recv().unwrap(), ProgressEvent::ScanCompleted { count: 3 });
    }

    #[test]
    fn late_subscriber_is_replayed_the_current_phase() {
        let bus = ProgressBus::new();
        bus.publish(ProgressEvent::StartHandlingFile { path: "a.pdf".into(), op: "ingest".into() });

        let rx = bus.subscribe();
        assert_eq!(rx.recv().unwrap(), ProgressEvent::StartHandlingFile { path: "a.pdf".into(), op: "ingest".into() });
    }

    #[test]
    fn late_subscriber_sees_scan_completed_finished_files_and_the_in_flight_file() {
        let bus = ProgressBus::new();
        bus.publish(ProgressEvent::Scanning);
        bus.publish(ProgressEvent::ScanCompleted { count: 5 });
        for path in ["a.pdf", "b.pdf", "c.pdf"] {
            bus.publish(ProgressEvent::StartHandlingFile { path: path.into(), op: "ingest".into() });
            bus.publish(ProgressEvent::CompleteHandlingFile { path: path.into() });
        }
        bus.publish(ProgressEvent::StartHandlingFile { path: "d.pdf".into(), op: "ingest".into() });
        bus.publish(ProgressEvent::ParseProgress { index: 2, total: 5 });

        let rx = bus.subscribe();
        assert_eq!(rx.recv().unwrap(), ProgressEvent::ScanCompleted { count: 5 });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::CompleteHandlingFile { path: "a.pdf".into() });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::CompleteHandlingFile { path: "b.pdf".into() });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::CompleteHandlingFile { path: "c.pdf".into() });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::StartHandlingFile { path: "d.pdf".into(), op: "ingest".into() });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::ParseProgress { index: 2, total: 5 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn late_subscriber_after_completion_sees_the_terminal_outcome_last() {
        let bus = ProgressBus::new();
        bus.publish(ProgressEvent::Scanning);
        bus.publish(ProgressEvent::ScanCompleted { count: 1 });
        bus.publish(ProgressEvent::StartHandlingFile { path: "a.pdf".into(), op: "ingest".into() });
        bus.publish(ProgressEvent::CompleteHandlingFile { path: "a.pdf".into() });
        bus.publish(ProgressEvent::Completed);

        let rx = bus.subscribe();
        assert_eq!(rx.recv().unwrap(), ProgressEvent::ScanCompleted { count: 1 });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::CompleteHandlingFile { path: "a.pdf".into() });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::Completed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn a_new_scan_resets_the_replayed_phase() {
        let bus = ProgressBus::new();
        bus.publish(ProgressEvent::Scanning);
        bus.publish(ProgressEvent::ScanCompleted { count: 1 });
        bus.publish(ProgressEvent::CompleteHandlingFile { path: "a.pdf".into() });
        bus.publish(ProgressEvent::Completed);

        bus.publish(ProgressEvent::Scanning);
        let rx = bus.subscribe();
        assert_eq!(rx.recv().unwrap(), ProgressEvent::Scanning);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn a_subscriber_with_no_prior_events_gets_nothing_until_published() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.publish(ProgressEvent::Completed);
        assert_eq!(rx.recv().unwrap(), ProgressEvent::Completed);
    }

    #[test]
    fn dropped_subscriber_does_not_block_future_publishes() {
        let bus = ProgressBus::new();
        {
            let _rx = bus.subscribe();
        }
        bus.publish(ProgressEvent::Scanning);
        assert_eq!(bus.subscribers.lock().unwrap().len(), 0);
    }
}
