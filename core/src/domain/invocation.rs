// SPDX-License-Identifier: MIT
//! The per-call ephemeral record (§3 Invocation context).

use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::tool::ParamValue;
use std::collections::BTreeMap;

/// Created when a call begins, destroyed when it returns. Never shared
/// across calls and never persisted.
pub struct InvocationContext {
    pub params: BTreeMap<String, ParamValue>,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    pub fn new(
        params: BTreeMap<String, ParamValue>,
        timeout: std::time::Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            params,
            deadline: Instant::now() + timeout,
            cancellation,
        }
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
