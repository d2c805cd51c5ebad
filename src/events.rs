//! Serial event executor
//!
//! All observer notifications and user completion callbacks run on one
//! dedicated thread, in submission order, so user code never executes on the
//! engine worker or a signaling delivery thread.

use tokio::sync::mpsc;
use tracing::debug;

const EVENT_QUEUE_THREAD_NAME: &str = "PeerConnectionChannelEventQueue";

type EventTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the channel's serial event executor
#[derive(Clone)]
pub(crate) struct EventQueue {
    tasks: mpsc::UnboundedSender<EventTask>,
}

impl EventQueue {
    /// Spawn the executor thread
    pub(crate) fn new() -> Self {
        let (tasks, mut queue) = mpsc::unbounded_channel::<EventTask>();
        std::thread::Builder::new()
            .name(EVENT_QUEUE_THREAD_NAME.to_string())
            .spawn(move || {
                while let Some(task) = queue.blocking_recv() {
                    task();
                }
                debug!("event queue drained and closed");
            })
            .expect("failed to spawn event queue thread");
        EventQueue { tasks }
    }

    /// Post a task; runs after every previously posted task has finished
    pub(crate) fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // A closed queue means the channel is shutting down; late events are
        // dropped on the floor.
        let _ = self.tasks.send(Box::new(task));
    }
}
