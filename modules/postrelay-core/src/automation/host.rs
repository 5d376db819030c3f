use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use postrelay_common::{ContextId, ContextMessage, RequestId};

use super::{AutomationHost, Automator, ResultSink};

/// Runs each automation context as its own Tokio task. Closing a context
/// aborts its task.
pub struct TaskHost {
    automator: Arc<dyn Automator>,
    tasks: Arc<Mutex<HashMap<ContextId, JoinHandle<()>>>>,
}

impl TaskHost {
    pub fn new(automator: Arc<dyn Automator>) -> Self {
        Self {
            automator,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of contexts currently running.
    pub fn open_contexts(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AutomationHost for TaskHost {
    async fn open(
        &self,
        target_url: &str,
        tag: RequestId,
        sink: ResultSink,
    ) -> anyhow::Result<ContextId> {
        let context = ContextId::new();
        let automator = self.automator.clone();
        let tasks = self.tasks.clone();
        let target_url = target_url.to_string();

        let mut running = self
            .tasks
            .lock()
            .map_err(|_| anyhow::anyhow!("automation task table poisoned"))?;

        let handle = tokio::spawn(async move {
            let result = automator.run(&target_url).await;
            // The receiver may be gone if the relay shut down.
            let _ = sink.send(ContextMessage {
                context,
                tag,
                result,
            });
            if let Ok(mut running) = tasks.lock() {
                running.remove(&context);
            }
            debug!(%context, "Automation context finished");
        });
        running.insert(context, handle);
        drop(running);

        info!(%context, %tag, "Automation context opened");
        Ok(context)
    }

    async fn close(&self, context: ContextId) -> bool {
        let handle = match self.tasks.lock() {
            Ok(mut running) => running.remove(&context),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                handle.abort();
                info!(%context, "Automation context closed");
                true
            }
            None => false,
        }
    }
}
