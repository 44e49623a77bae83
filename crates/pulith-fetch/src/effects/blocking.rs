use std::io;

use crate::error::Result;

/// Run filesystem work on tokio's blocking pool so it never stalls a worker
/// thread. Panics in `work` resume on the caller.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(pulith_store::Error::from(io::Error::other(e)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test(flavor = "current_thread")]
    async fn work_runs_off_the_runtime_thread() {
        let caller = std::thread::current().id();
        let worker = run_blocking(move || Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let result: Result<()> = run_blocking(|| {
            Err(Error::Timeout {
                url: "https://example.org/".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}
