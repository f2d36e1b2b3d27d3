// SPDX-License-Identifier: MIT
//! Fault isolation (§4.7): converts an abnormal termination inside a
//! handler invocation — a panic, an arithmetic trap — into a protocol-level
//! `ToolError::Internal`, so one misbehaving tool call never corrupts or
//! halts the server. Each call is spawned onto its own task so a panic
//! cannot unwind across an await point shared with other invocations.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::domain::errors::ToolError;

/// Runs `call` to completion, catching any panic it raises and reporting it
/// as `ToolError::Internal` instead of propagating the unwind.
pub async fn isolate<F>(call: F) -> Result<String, ToolError>
where
    F: Future<Output = Result<String, ToolError>> + Send + 'static,
{
    let task = tokio::spawn(AssertUnwindSafe(call).catch_unwind());
    match task.await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(ToolError::Internal(describe_panic(panic))),
        Err(join_error) => Err(ToolError::Internal(format!("handler task failed: {join_error}"))),
    }
}

fn describe_panic(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

/// Same protection around the process's own main entrypoint, so a
/// developer error exits cleanly instead of aborting the process.
pub async fn isolate_entrypoint<F>(main: F) -> Result<(), String>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(AssertUnwindSafe(main).catch_unwind()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(panic)) => Err(describe_panic(panic)),
        Err(join_error) => Err(format!("entrypoint task failed: {join_error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_a_successful_call() {
        let result = isolate(async { Ok("ok".to_string()) }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn passes_through_a_normal_error() {
        let result = isolate(async { Err(ToolError::Internal("boom".to_string())) }).await;
        assert!(matches!(result, Err(ToolError::Internal(_))));
    }

    #[tokio::test]
    async fn converts_a_panic_into_an_internal_error() {
        let result = isolate(async {
            panic!("handler blew up");
            #[allow(unreachable_code)]
            Ok(String::new())
        })
        .await;
        match result {
            Err(ToolError::Internal(message)) => assert!(message.contains("handler blew up")),
            other => panic!("expected ToolError::Internal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn entrypoint_panic_is_reported_not_propagated() {
        let result = isolate_entrypoint(async {
            panic!("entrypoint blew up");
        })
        .await;
        assert!(result.unwrap_err().contains("entrypoint blew up"));
    }
}
