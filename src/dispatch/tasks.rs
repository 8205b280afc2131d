use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::outcome::Outcome;

/// Wraps a future to catch panics and convert them to errors.
///
/// Instead of the task silently disappearing, a panic becomes `Err(String)`
/// holding the panic message.
pub(super) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

/// Run a gateway call in the background and report exactly one outcome.
pub(super) fn spawn_call<F>(task: &'static str, tx: mpsc::Sender<Outcome>, call: F) -> JoinHandle<()>
where
    F: Future<Output = Outcome> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match catch_task_panic(call).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(task, error = %error, "Task panicked");
                Outcome::TaskPanicked { task, error }
            }
        };
        if let Err(e) = tx.send(outcome).await {
            tracing::warn!(task, error = %e, "Channel send failed (receiver dropped)");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_task_panic_ok() {
        assert_eq!(catch_task_panic(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_catch_task_panic_message() {
        let result: Result<(), String> = catch_task_panic(async { panic!("boom") }).await;
        assert_eq!(result, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_spawn_call_reports_panic_as_outcome() {
        let (tx, mut rx) = mpsc::channel(1);
        spawn_call("explode", tx, async { panic!("kaboom") });

        match rx.recv().await {
            Some(Outcome::TaskPanicked { task, error }) => {
                assert_eq!(task, "explode");
                assert!(error.contains("kaboom"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
