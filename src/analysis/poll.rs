use super::{AnalysisError, AnalysisOutcome, AnalyzeOperation, OperationStatus, PollPolicy};
use async_trait::async_trait;

/// Anything that can report the current state of an analysis operation.
#[async_trait]
pub trait OperationStatusSource: Send + Sync {
    /// Fetch the operation state behind `location`.
    async fn fetch_status(&self, location: &str) -> Result<AnalyzeOperation, AnalysisError>;
}

/// Poll `location` until the operation is terminal or `policy.max_polls` polls were issued.
///
/// The first poll happens immediately; `policy.interval` separates subsequent polls.
pub async fn poll_until_terminal<S>(
    source: &S,
    location: &str,
    policy: PollPolicy,
) -> Result<AnalysisOutcome, AnalysisError>
where
    S: OperationStatusSource + ?Sized,
{
    let mut polls = 0;
    while polls < policy.max_polls {
        if polls > 0 {
            tokio::time::sleep(policy.interval).await;
        }
        polls += 1;
        let operation = source.fetch_status(location).await?;
        tracing::debug!(poll = polls, status = ?operation.status, "Analysis status");

        if !operation.status.is_terminal() {
            continue;
        }
        return Ok(if operation.status == OperationStatus::Succeeded {
            operation
                .analyze_result
                .and_then(|result| result.content)
                .map_or(AnalysisOutcome::NoContent, AnalysisOutcome::Succeeded)
        } else {
            AnalysisOutcome::Failed {
                detail: operation.error.map(|error| error.to_string()),
            }
        });
    }

    tracing::warn!(polls, location, "Analysis poll bound reached");
    Ok(AnalysisOutcome::TimedOut { polls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedSource {
        responses: Mutex<VecDeque<&'static str>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(responses: &[&'static str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().copied().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperationStatusSource for ScriptedSource {
        async fn fetch_status(&self, _location: &str) -> Result<AnalyzeOperation, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .responses
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or(r#"{"status":"running"}"#);
            serde_json::from_str(body).map_err(|err| AnalysisError::InvalidResponse(err.to_string()))
        }
    }

    fn policy(max_polls: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_polls,
        }
    }

    #[tokio::test]
    async fn polls_until_succeeded_and_returns_content() {
        let source = ScriptedSource::new(&[
            r#"{"status":"running"}"#,
            r#"{"status":"running"}"#,
            r#"{"status":"succeeded","analyzeResult":{"content":"Scope: mobile app"}}"#,
        ]);

        let outcome = poll_until_terminal(&source, "op", policy(10))
            .await
            .expect("poll");

        assert_eq!(source.calls(), 3);
        assert_eq!(outcome, AnalysisOutcome::Succeeded("Scope: mobile app".into()));
    }

    #[tokio::test]
    async fn failed_operation_stops_polling() {
        let source = ScriptedSource::new(&[
            r#"{"status":"notStarted"}"#,
            r#"{"status":"failed","error":{"code":"InvalidContent"}}"#,
        ]);

        let outcome = poll_until_terminal(&source, "op", policy(10))
            .await
            .expect("poll");

        assert_eq!(source.calls(), 2);
        match outcome {
            AnalysisOutcome::Failed { detail } => {
                assert!(detail.expect("detail").contains("InvalidContent"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_status_keeps_polling() {
        let source = ScriptedSource::new(&[
            r#"{"status":"canceled"}"#,
            r#"{"status":"succeeded","analyzeResult":{}}"#,
        ]);

        let outcome = poll_until_terminal(&source, "op", policy(10))
            .await
            .expect("poll");

        assert_eq!(source.calls(), 2);
        assert_eq!(outcome, AnalysisOutcome::NoContent);
    }

    #[tokio::test]
    async fn gives_up_after_max_polls() {
        let source = ScriptedSource::new(&[]);

        let outcome = poll_until_terminal(&source, "op", policy(4))
            .await
            .expect("poll");

        assert_eq!(source.calls(), 4);
        assert_eq!(outcome, AnalysisOutcome::TimedOut { polls: 4 });
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let source = ScriptedSource::new(&["not json"]);
        let error = poll_until_terminal(&source, "op", policy(3))
            .await
            .expect_err("decode error");
        assert!(matches!(error, AnalysisError::InvalidResponse(_)));
    }
}
