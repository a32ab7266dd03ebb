// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A single-shot readiness rendezvous.

use crate::error::EngineError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// A single-shot rendezvous: many waiters, one value per arming.
///
/// [`Completer::set`] with `Some` resolves all current and future
/// waiters with the value; setting it again is a no-op, so at most one
/// value is ever observed per arming. `set(None)` means "not yet": it
/// clears any stored value without disturbing pending waiters.
/// [`Completer::reset`] cancels pending waiters and rearms.
///
/// Cloning is cheap and all clones share the same state.
pub struct Completer<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    value: Option<T>,
    waiters: Vec<oneshot::Sender<Result<T, EngineError>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Completer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completer<T> {
    /// Create a new, unresolved completer.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value: None,
                waiters: Vec::new(),
            })),
        }
    }
}

impl<T: Clone + Send + 'static> Completer<T> {
    /// Wait for the value.
    ///
    /// Resolves with the stored value (immediately, if one is already
    /// set), fails with `on_timeout()` once `deadline` elapses, or
    /// fails with [`EngineError::Cancelled`] if [`Completer::reset`]
    /// runs first.
    pub async fn wait(
        &self,
        deadline: Duration,
        on_timeout: impl FnOnce() -> EngineError,
    ) -> Result<T, EngineError> {
        let rx = {
            let mut inner = self.lock();
            if let Some(value) = &inner.value {
                return Ok(value.clone());
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::Cancelled("completer was dropped".to_owned())),
            Err(_) => Err(on_timeout()),
        }
    }

    /// Resolve or clear the completer.
    ///
    /// `Some(value)` resolves all pending waiters and is remembered for
    /// future ones; if a value is already stored this does nothing.
    /// `None` clears the stored value and leaves pending waiters
    /// suspended.
    pub fn set(&self, value: Option<T>) {
        let Some(value) = value else {
            self.lock().value = None;
            return;
        };

        let waiters = {
            let mut inner = self.lock();
            if inner.value.is_some() {
                return;
            }
            inner.value = Some(value.clone());
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Ok(value.clone()));
        }
    }

    /// Cancel all pending waiters and rearm.
    pub fn reset(&self) {
        let waiters = {
            let mut inner = self.lock();
            inner.value = None;
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(EngineError::Cancelled(
                "completer was reset".to_owned(),
            )));
        }
    }

    /// Whether a value is currently stored.
    pub fn is_resolved(&self) -> bool {
        self.lock().value.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        // Not held across await points, so poisoning means a panic in
        // another short critical section; propagating it helps nobody.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
