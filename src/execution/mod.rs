//! Invocation executor
//!
//! Submits one tool call at a time to the protocol client with:
//! - a fresh timeout scope per call, bounded by the call timeout
//! - failures preserved for classification and display
//!
//! The call timeout is deliberately separate from the connection/listing
//! timeout; a long call never borrows budget from the next one.

use crate::client::{self, ClientError, ProtocolClient};
use crate::core::classify::{classify, ClassifiedError, ErrorCategory};
use crate::core::{InvocationRequest, InvocationResult, ParameterSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Tool call '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl InvocationError {
    /// Deadline expiry is always a timeout; anything else is classified by message
    pub fn classify(&self) -> ClassifiedError {
        match self {
            InvocationError::Timeout { .. } => {
                ClassifiedError::new(ErrorCategory::Timeout, self.to_string())
            }
            InvocationError::Client(e) => classify(&e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InvocationError>;

pub struct Executor {
    client: Arc<dyn ProtocolClient>,
    call_timeout: Duration,
}

impl Executor {
    pub fn new(client: Arc<dyn ProtocolClient>, call_timeout: Duration) -> Self {
        Executor {
            client,
            call_timeout,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Call `tool_name` with `arguments` and return the server's result verbatim.
    ///
    /// A result with `isError` set is still `Ok`; only transport, protocol
    /// and deadline failures are errors.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: ParameterSet,
    ) -> Result<InvocationResult> {
        let request = InvocationRequest::new(tool_name, arguments);
        info!(
            "Calling tool {} with {} arguments (timeout {:?})",
            request.tool_name,
            request.arguments.len(),
            self.call_timeout
        );

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.call_timeout, self.client.call_tool(&request)).await;

        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    "Tool {} returned {} content items in {:?}",
                    request.tool_name,
                    result.content.len(),
                    started.elapsed()
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", request.tool_name, e);
                Err(InvocationError::Client(e))
            }
            Err(_) => {
                warn!(
                    "Tool {} timed out after {:?}",
                    request.tool_name, self.call_timeout
                );
                Err(InvocationError::Timeout {
                    tool: request.tool_name,
                    after: self.call_timeout,
                })
            }
        }
    }
}

/// Run a handshake or listing operation inside the connection/listing scope.
///
/// Failures come back already classified, since every caller only reports them.
pub async fn bounded<T, F>(
    limit: Duration,
    what: &str,
    operation: F,
) -> std::result::Result<T, ClassifiedError>
where
    F: Future<Output = client::Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("{} failed: {}", what, e);
            Err(classify(&e.to_string()))
        }
        Err(_) => {
            warn!("{} timed out after {:?}", what, limit);
            Err(ClassifiedError::new(
                ErrorCategory::Timeout,
                format!("{} timed out after {:?}", what, limit),
            ))
        }
    }
}
