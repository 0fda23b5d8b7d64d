// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-size pool of reusable worker handles
//!
//! A worker is checked out with [`WorkerPool::acquire`] and handed back when
//! the returned [`WorkerLease`] is dropped, whichever way the caller exits.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,

    #[error("worker pool holds a permit but no idle worker")]
    Exhausted,
}

struct PoolInner<W> {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<W>>,
    size: usize,
}

impl<W> PoolInner<W> {
    fn checkin(&self, worker: W) {
        // A poisoned lock still guards a valid Vec
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.push(worker);
    }
}

/// Bounded set of workers shared by all requests
pub struct WorkerPool<W> {
    inner: Arc<PoolInner<W>>,
}

impl<W> Clone for WorkerPool<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> std::fmt::Debug for WorkerPool<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.inner.size)
            .field("available", &self.inner.semaphore.available_permits())
            .finish()
    }
}

impl<W: Send + 'static> WorkerPool<W> {
    pub fn new(workers: Vec<W>) -> Self {
        let size = workers.len();
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(workers),
                size,
            }),
        }
    }

    /// Total number of workers
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Workers not currently leased
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Wait for a free worker
    pub async fn acquire(&self) -> Result<WorkerLease<W>, PoolError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        self.lease(permit)
    }

    /// Take a free worker without waiting
    pub fn try_acquire(&self) -> Option<WorkerLease<W>> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;
        self.lease(permit).ok()
    }

    /// Refuse further acquisitions; outstanding leases still return normally
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> Result<WorkerLease<W>, PoolError> {
        let worker = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .ok_or(PoolError::Exhausted)?;

        Ok(WorkerLease {
            worker: Some(worker),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }
}

/// A checked-out worker. Dropping the lease returns the worker, then
/// releases its permit.
pub struct WorkerLease<W> {
    worker: Option<W>,
    pool: Arc<PoolInner<W>>,
    _permit: OwnedSemaphorePermit,
}

impl<W> Deref for WorkerLease<W> {
    type Target = W;

    fn deref(&self) -> &W {
        // Only taken in Drop
        match self.worker.as_ref() {
            Some(w) => w,
            None => unreachable!("worker taken before drop"),
        }
    }
}

impl<W> DerefMut for WorkerLease<W> {
    fn deref_mut(&mut self) -> &mut W {
        match self.worker.as_mut() {
            Some(w) => w,
            None => unreachable!("worker taken before drop"),
        }
    }
}

impl<W> Drop for WorkerLease<W> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.checkin(worker);
        }
    }
}
