//! Timer scheduling on the tokio runtime.
//!
//! Every timer is a spawned task that sleeps and then posts a
//! [`DaemonEvent::Timer`] back into the event loop, so timer callbacks run
//! on the loop like every other event. Cancelling aborts the task; a timer
//! whose event is already queued still arrives and is discarded by the
//! engine as stale.

use crate::DaemonEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use widedesk_core::{Scheduler, TimerId, TimerTask};

pub struct TokioScheduler {
    events: mpsc::Sender<DaemonEvent>,
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            events,
            next_id: 0,
            timers: HashMap::new(),
        }
    }

    /// Forget a timer whose event has been delivered.
    pub fn fired(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }

    /// Timers whose task has not finished yet.
    #[cfg(test)]
    pub fn armed(&self) -> usize {
        self.timers.values().filter(|handle| !handle.is_finished()).count()
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let timer = TimerId(self.next_id);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Channel closed: daemon shutting down
            let _ = events.send(DaemonEvent::Timer { timer, task }).await;
        });
        self.timers.insert(timer, handle);
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_delivers_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = TokioScheduler::new(tx);

        let timer = scheduler.schedule(Duration::from_millis(50), TimerTask::RetileFlush);
        match rx.recv().await {
            Some(DaemonEvent::Timer { timer: fired, task }) => {
                assert_eq!(fired, timer);
                assert_eq!(task, TimerTask::RetileFlush);
            }
            _ => panic!("Expected timer event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut scheduler = TokioScheduler::new(tx);

        let cancelled = scheduler.schedule(Duration::from_millis(10), TimerTask::ClipFallback(1));
        let kept = scheduler.schedule(Duration::from_millis(20), TimerTask::ClipFallback(2));
        scheduler.cancel(cancelled);

        match rx.recv().await {
            Some(DaemonEvent::Timer { timer, .. }) => assert_eq!(timer, kept),
            _ => panic!("Expected timer event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ids_are_unique() {
        let (tx, _rx) = mpsc::channel(8);
        let mut scheduler = TokioScheduler::new(tx);

        let a = scheduler.schedule(Duration::from_secs(1), TimerTask::RetileFlush);
        let b = scheduler.schedule(Duration::from_secs(1), TimerTask::RetileFlush);
        assert_ne!(a, b);
        assert_eq!(scheduler.armed(), 2);

        scheduler.cancel_all();
        assert_eq!(scheduler.armed(), 0);
    }
}
