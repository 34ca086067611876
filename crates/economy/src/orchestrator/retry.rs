use std::{future::Future, time::Duration};

use crate::{ResultEconomy, settings::OrchestratorSettings};

/// Run `op` until it succeeds, fails with a non-retryable error or uses up
/// `max_attempts`. The delay starts at `backoff_ms` and doubles.
pub(crate) async fn with_retry<T, F, Fut>(
    step: &str,
    settings: &OrchestratorSettings,
    mut op: F,
) -> ResultEconomy<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultEconomy<T>>,
{
    let mut attempt = 1;
    let mut delay = settings.backoff_ms;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < settings.max_attempts => {
                tracing::warn!(
                    "{step} failed (attempt {attempt}/{}), retrying in {delay}ms: {err}",
                    settings.max_attempts
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!("{step} failed after {attempt} attempts: {err}");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use sea_orm::DbErr;

    use super::*;
    use crate::EconomyError;

    fn fast() -> OrchestratorSettings {
        OrchestratorSettings {
            max_attempts: 3,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn storage_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = with_retry("flaky", &fast(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EconomyError::Storage(DbErr::Custom("locked".to_string())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(value, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value: ResultEconomy<()> = with_retry("down", &fast(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EconomyError::Storage(DbErr::Custom("down".to_string())))
        })
        .await;
        assert!(value.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_outcomes_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value: ResultEconomy<()> = with_retry("spend", &fast(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EconomyError::InsufficientBalance {
                required: 10,
                available: 0,
            })
        })
        .await;
        assert!(value.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
