// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

pub type TaskSet = JoinSet<Result<(), BoxError>>;

pub async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut TaskSet,
    timeout: Duration,
) -> Result<(), BoxError> {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Join every task, keeping the last task error seen. Gives up at `stop_at`.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut TaskSet,
    stop_at: Instant,
) -> Result<(), BoxError> {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                Err(e) => error!("Failed to join with task: {:?}", e),
            },
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_any_task() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async { Err("upload halted".into()) });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let err = wait_for_any_task(&mut tasks).await.unwrap_err();
        assert_eq!(err.to_string(), "upload halted");
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_wait_empty_set() {
        let mut tasks = TaskSet::new();
        assert!(wait_for_any_task(&mut tasks).await.is_ok());
        assert!(
            wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(10))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(1)).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_wait_keeps_task_error() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err("boom".into()) });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(5)).await;
        assert_eq!(res.unwrap_err().to_string(), "boom");
    }
}
