// src/remote/poll.rs

//! Bounded polling of a remote thread.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::model::PollingSection;
use crate::errors::Result;
use crate::remote::{TaskEvent, TaskTracker};

/// Where a thread stands, judged from its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Not every task in the thread has reported completion yet.
    Pending,
    /// Every task seen in the thread has a `completed` event.
    Completed,
    /// Some task reported `failed`.
    Failed,
}

/// Terminal result of [`poll_thread`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadOutcome {
    Completed,
    /// The remote reported failure; carries the `failed` events.
    Failed(Vec<TaskEvent>),
    /// The retry bound ran out before a terminal status was seen.
    TimedOut { attempts: u32 },
}

/// Classify a thread from its event stream.
pub fn thread_status(events: &[TaskEvent]) -> ThreadStatus {
    if events.iter().any(|e| e.status == "failed") {
        return ThreadStatus::Failed;
    }

    let tasks: HashSet<&str> = events
        .iter()
        .filter_map(|e| e.task.as_ref().map(|t| t.task_id.as_str()))
        .collect();
    let completed: HashSet<&str> = events
        .iter()
        .filter(|e| e.status == "completed")
        .filter_map(|e| e.task.as_ref().map(|t| t.task_id.as_str()))
        .collect();

    if !tasks.is_empty() && tasks.is_subset(&completed) {
        ThreadStatus::Completed
    } else {
        ThreadStatus::Pending
    }
}

/// Poll a thread's events until it completes, fails, or `policy.retry_max`
/// attempts have been made, sleeping `policy.interval()` between attempts.
///
/// Network and HTTP errors from the tracker are returned as `Err`; the two
/// remote outcomes are reported through [`ThreadOutcome`].
pub async fn poll_thread(
    tracker: &dyn TaskTracker,
    thread_id: &str,
    policy: PollingSection,
) -> Result<ThreadOutcome> {
    let attempts = policy.retry_max.max(1);

    for attempt in 1..=attempts {
        let events = tracker.thread_events(thread_id).await?;
        match thread_status(&events) {
            ThreadStatus::Completed => {
                info!(thread_id = %thread_id, attempt, "remote thread completed");
                return Ok(ThreadOutcome::Completed);
            }
            ThreadStatus::Failed => {
                let failures: Vec<TaskEvent> = tracker
                    .thread_events(thread_id)
                    .await?
                    .into_iter()
                    .filter(|e| e.status == "failed")
                    .collect();
                return Ok(ThreadOutcome::Failed(failures));
            }
            ThreadStatus::Pending => {
                debug!(thread_id = %thread_id, attempt, attempts, "thread not complete yet");
                if attempt < attempts {
                    tokio::time::sleep(policy.interval()).await;
                }
            }
        }
    }

    Ok(ThreadOutcome::TimedOut { attempts })
}
