//! Run/done operation lifecycle.
//!
//! An [`Operation`] pairs a `run` step that produces a value with a `done`
//! step that releases whatever `run` used. [`execute`] runs both with the
//! ordering and error-precedence rules of a `try`/`finally` block:
//!
//! | `run`          | `done`   | result                              |
//! |----------------|----------|-------------------------------------|
//! | `Ok(v)`        | `Ok`     | `Ok(v)`                             |
//! | `Ok(v)`        | `Err(d)` | `Err(HttpError::Cleanup(d))`        |
//! | `Err(r)`       | `Ok`     | `Err(r)` normalized                 |
//! | `Err(r)`       | `Err(d)` | `Err(r)` normalized, `d` discarded  |
//!
//! `done` runs exactly once, after `run`, for every outcome including a
//! panic in `run` (the panic resumes once `done` has finished).

use crate::error::{HttpError, OperationError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;

/// A unit of work with a guaranteed cleanup step.
///
/// # Example
///
/// ```ignore
/// struct FetchStatus {
///     connection: Connection,
/// }
///
/// impl Operation for FetchStatus {
///     type Output = http::StatusCode;
///
///     async fn run(&mut self) -> Result<Self::Output, OperationError> {
///         Ok(self.connection.send(Bytes::new()).await?.status())
///     }
///
///     async fn done(&mut self) -> io::Result<()> {
///         self.connection.disconnect().await
///     }
/// }
///
/// let status = execute(FetchStatus { connection }).await?;
/// ```
pub trait Operation: Send {
    /// Value produced by a successful `run`
    type Output: Send;

    /// Perform the work.
    ///
    /// Fail with [`OperationError::Request`] for errors that are already
    /// normalized, or [`OperationError::Io`] for raw transport failures.
    fn run(&mut self) -> impl Future<Output = Result<Self::Output, OperationError>> + Send;

    /// Release resources used by `run`. Called exactly once, after `run`.
    fn done(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Execute an operation: `run`, then always `done`.
///
/// # Errors
///
/// - The normalized `run` failure, whether or not `done` also failed
/// - `HttpError::Cleanup` if `run` succeeded and `done` failed
///
/// # Panics
///
/// Re-raises a panic from `run` after `done` has completed.
pub async fn execute<O: Operation>(mut op: O) -> Result<O::Output, HttpError> {
    let outcome = AssertUnwindSafe(op.run()).catch_unwind().await;
    let cleanup = op.done().await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(panic) => std::panic::resume_unwind(panic),
    };

    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(HttpError::Cleanup(err)),
        (Err(err), _) => Err(err.normalize()),
    }
}

/// Execute a `run`/`done` closure pair over caller-owned `state`.
///
/// Both closures borrow `state` mutably; `state` is dropped once `done` has
/// returned.
///
/// # Example
///
/// ```ignore
/// let connection = DEFAULT_CONNECTION_FACTORY.create(url)?;
/// let body = execute_with(
///     connection,
///     |conn| Box::pin(async move { Ok(conn.send(Bytes::new()).await?.text()) }),
///     |conn| Box::pin(conn.disconnect()),
/// )
/// .await?;
/// ```
///
/// # Errors
///
/// Same as [`execute`].
pub async fn execute_with<S, V, R, D>(state: S, run: R, done: D) -> Result<V, HttpError>
where
    S: Send,
    V: Send,
    R: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<V, OperationError>> + Send,
    D: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, io::Result<()>> + Send,
{
    execute(FnOperation { state, run, done }).await
}

struct FnOperation<S, R, D> {
    state: S,
    run: R,
    done: D,
}

impl<S, V, R, D> Operation for FnOperation<S, R, D>
where
    S: Send,
    V: Send,
    R: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<V, OperationError>> + Send,
    D: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, io::Result<()>> + Send,
{
    type Output = V;

    fn run(&mut self) -> impl Future<Output = Result<V, OperationError>> + Send {
        (self.run)(&mut self.state)
    }

    fn done(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        (self.done)(&mut self.state)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Run,
        Done,
    }

    type Log = Arc<Mutex<Vec<Step>>>;

    enum RunOutcome<V> {
        Value(V),
        Io(&'static str),
        Domain(http::StatusCode),
        Panic,
    }

    struct Scripted<V> {
        log: Log,
        run: Option<RunOutcome<V>>,
        done: Option<&'static str>,
    }

    impl<V> Scripted<V> {
        fn new(log: &Log, run: RunOutcome<V>, done: Option<&'static str>) -> Self {
            Self {
                log: log.clone(),
                run: Some(run),
                done,
            }
        }
    }

    impl<V: Send> Operation for Scripted<V> {
        type Output = V;

        async fn run(&mut self) -> Result<V, OperationError> {
            self.log.lock().unwrap().push(Step::Run);
            match self.run.take().expect("run called twice") {
                RunOutcome::Value(value) => Ok(value),
                RunOutcome::Io(msg) => Err(io::Error::other(msg).into()),
                RunOutcome::Domain(status) => Err(HttpError::HttpStatus {
                    status,
                    body_preview: String::new(),
                    content_type: None,
                }
                .into()),
                RunOutcome::Panic => panic!("run exploded"),
            }
        }

        async fn done(&mut self) -> io::Result<()> {
            self.log.lock().unwrap().push(Step::Done);
            match self.done {
                Some(msg) => Err(io::Error::other(msg)),
                None => Ok(()),
            }
        }
    }

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn steps(log: &Log) -> Vec<Step> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_success_returns_run_value() {
        let log = new_log();
        let value = execute(Scripted::new(&log, RunOutcome::Value("OK"), None))
            .await
            .unwrap();

        assert_eq!(value, "OK");
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_run_io_failure_is_wrapped() {
        let log = new_log();
        let err = execute(Scripted::<()>::new(&log, RunOutcome::Io("timeout"), None))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, HttpError::Io(inner) if inner.to_string() == "timeout"),
            "got: {err:?}"
        );
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_run_failure_wins_over_done_failure() {
        let log = new_log();
        let err = execute(Scripted::<()>::new(
            &log,
            RunOutcome::Io("timeout"),
            Some("close failed"),
        ))
        .await
        .unwrap_err();

        assert!(matches!(err, HttpError::Io(_)), "got: {err:?}");
        assert!(!format!("{err:?}").contains("close failed"));
        assert!(!err.to_string().contains("close failed"));
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_done_failure_surfaces_when_run_succeeds() {
        let log = new_log();
        let err = execute(Scripted::new(
            &log,
            RunOutcome::Value(42),
            Some("flush failed"),
        ))
        .await
        .unwrap_err();

        match err {
            HttpError::Cleanup(inner) => assert_eq!(inner.to_string(), "flush failed"),
            other => panic!("expected Cleanup, got: {other:?}"),
        }
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_domain_error_passes_through_unchanged() {
        let log = new_log();
        let err = execute(Scripted::<()>::new(
            &log,
            RunOutcome::Domain(http::StatusCode::NOT_FOUND),
            Some("close failed"),
        ))
        .await
        .unwrap_err();

        assert!(
            matches!(err, HttpError::HttpStatus { status, .. } if status == http::StatusCode::NOT_FOUND),
            "got: {err:?}"
        );
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_done_runs_when_run_panics() {
        let log = new_log();
        let handle = tokio::spawn(execute(Scripted::<()>::new(
            &log,
            RunOutcome::Panic,
            None,
        )));

        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_operations_do_not_interfere() {
        let mut handles = Vec::new();
        for i in 0..64u32 {
            let log = new_log();
            let (run, done) = match i % 4 {
                0 => (RunOutcome::Value(i), None),
                1 => (RunOutcome::Io("run failed"), None),
                2 => (RunOutcome::Value(i), Some("done failed")),
                _ => (RunOutcome::Io("run failed"), Some("done failed")),
            };
            let op = Scripted::new(&log, run, done);
            handles.push(tokio::spawn(async move {
                let result = execute(op).await;
                (i, result, steps(&log))
            }));
        }

        for handle in handles {
            let (i, result, steps) = handle.await.unwrap();
            assert_eq!(steps, vec![Step::Run, Step::Done], "op {i}");
            match (i % 4, result) {
                (0, Ok(value)) => assert_eq!(value, i),
                (1 | 3, Err(HttpError::Io(err))) => assert_eq!(err.to_string(), "run failed"),
                (2, Err(HttpError::Cleanup(err))) => assert_eq!(err.to_string(), "done failed"),
                (case, other) => panic!("op {i} (case {case}) got unexpected result: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_execute_with_closures() {
        let log = new_log();

        let value = execute_with(
            log.clone(),
            |log| {
                Box::pin(async move {
                    log.lock().unwrap().push(Step::Run);
                    Ok::<_, OperationError>(7)
                })
            },
            |log| {
                Box::pin(async move {
                    log.lock().unwrap().push(Step::Done);
                    Err::<(), _>(io::Error::other("close failed"))
                })
            },
        )
        .await;

        assert!(matches!(value, Err(HttpError::Cleanup(_))), "got: {value:?}");
        assert_eq!(steps(&log), vec![Step::Run, Step::Done]);
    }

    #[tokio::test]
    async fn test_suppressed_cleanup_failure_is_not_logged() {
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct EventCapture {
            events: Arc<Mutex<Vec<String>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                let mut visitor = FieldsVisitor(Vec::new());
                event.record(&mut visitor);
                self.events.lock().unwrap().push(visitor.0.join(" "));
            }
        }

        struct FieldsVisitor(Vec<String>);
        impl tracing::field::Visit for FieldsVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                self.0.push(format!("{}={value:?}", field.name()));
            }
        }

        let capture = EventCapture::default();
        let events = capture.events.clone();
        let subscriber = tracing_subscriber::registry().with(capture);
        let _guard = tracing::subscriber::set_default(subscriber);

        let log = new_log();
        let err = execute(Scripted::<()>::new(
            &log,
            RunOutcome::Io("timeout"),
            Some("close failed"),
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, HttpError::Io(_)));

        let captured = events.lock().unwrap();
        assert!(
            captured.iter().all(|e| !e.contains("close failed")),
            "cleanup failure leaked into logs: {:?}",
            *captured
        );
    }
}
