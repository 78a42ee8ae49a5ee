use crate::api::{ChatApi, ChatRequest};
use crate::error::LlmError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// One queued chat request with its reply channel.
pub(crate) struct Job {
    pub request: ChatRequest,
    pub respond: oneshot::Sender<Result<String, LlmError>>,
}

/// The pacing knobs the worker enforces between upstream requests.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pacing {
    pub min_interval: Duration,
    pub post_delay: Duration,
    pub backoff: Duration,
}

/// Spawns the single worker that serializes every LLM request in the process.
///
/// The worker owns a FIFO deque fed by the channel. Between pops it enforces
/// the minimum inter-request spacing and the post-request delay; an upstream
/// 429 sleeps the penalty and re-inserts the job at the head of the queue, so
/// cross-request ordering is preserved even through back-off.
pub(crate) fn spawn_worker(
    api: Arc<dyn ChatApi>,
    pacing: Pacing,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    tokio::spawn(async move {
        let mut queue: VecDeque<Job> = VecDeque::new();
        let mut last_request: Option<Instant> = None;

        loop {
            if queue.is_empty() {
                match rx.recv().await {
                    Some(job) => queue.push_back(job),
                    // All senders dropped: the client is gone, stop the worker.
                    None => break,
                }
            }
            while let Ok(job) = rx.try_recv() {
                queue.push_back(job);
            }

            let job = queue.pop_front().expect("queue non-empty by construction");

            if let Some(last) = last_request {
                let since = last.elapsed();
                if since < pacing.min_interval {
                    tokio::time::sleep(pacing.min_interval - since).await;
                }
            }

            let result = api.complete(&job.request).await;
            last_request = Some(Instant::now());

            match result {
                Err(LlmError::RateLimited) => {
                    tracing::warn!(
                        backoff_ms = pacing.backoff.as_millis() as u64,
                        "LLM upstream rate limited, backing off and retrying"
                    );
                    queue.push_front(job);
                    tokio::time::sleep(pacing.backoff).await;
                }
                result => {
                    // Receiver may have given up; that is their problem.
                    let _ = job.respond.send(result);
                    tokio::time::sleep(pacing.post_delay).await;
                }
            }
        }
    });
}
