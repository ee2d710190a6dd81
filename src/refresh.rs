//! Level-reset (bootstrap) policy.
use std::borrow::Cow;

use rayon::prelude::*;
use tracing::debug;

use crate::{
    backend::Backend,
    error::{StatError, StatResult},
    vector::VectorHandle,
};

/// Decides when a handle must be refreshed before an operation runs.
///
/// A disabled scheduler never refreshes; operations that would run out of
/// level then fail with [`StatError::InsufficientLevel`].
#[derive(Clone, Copy, Debug)]
pub struct BootstrapScheduler {
    enabled: bool,
}

impl BootstrapScheduler {
    /// Scheduler that refreshes only when `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether refreshes are available at all.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Unconditional refresh of every container. Containers are independent,
    /// so they are bootstrapped in parallel.
    pub fn refresh<B: Backend>(
        &self,
        backend: &B,
        handle: &VectorHandle<B::Ciphertext>,
        min_level: usize,
    ) -> StatResult<VectorHandle<B::Ciphertext>> {
        Self::check_reachable(backend, min_level, "refresh")?;
        let before = handle.level();
        let containers = handle
            .containers()
            .par_iter()
            .map(|ct| backend.bootstrap(ct, min_level))
            .collect::<Result<Vec<_>, _>>()?;
        let level = containers
            .first()
            .map_or(backend.params().max_level, |ct| backend.level(ct));
        debug!(
            containers = containers.len(),
            before, after = level, "refreshed vector"
        );
        Ok(VectorHandle::from_parts(
            containers,
            handle.size(),
            level,
            handle.scale(),
            handle.tail_clean(),
        ))
    }

    /// Refreshes when enabled and fewer than `depth` levels remain;
    /// otherwise hands the vector back untouched.
    pub fn refresh_below<B: Backend>(
        &self,
        backend: &B,
        handle: VectorHandle<B::Ciphertext>,
        depth: usize,
    ) -> StatResult<VectorHandle<B::Ciphertext>> {
        if self.enabled && handle.level() < depth {
            self.refresh(backend, &handle, depth)
        } else {
            Ok(handle)
        }
    }

    /// Guarantees at least `needed` levels before `op` runs.
    pub fn ensure<'a, B: Backend>(
        &self,
        backend: &B,
        handle: &'a VectorHandle<B::Ciphertext>,
        needed: usize,
        op: &'static str,
    ) -> StatResult<Cow<'a, VectorHandle<B::Ciphertext>>> {
        if handle.level() >= needed {
            return Ok(Cow::Borrowed(handle));
        }
        if !self.enabled {
            return Err(StatError::InsufficientLevel {
                op,
                needed,
                available: handle.level(),
            });
        }
        Self::check_reachable(backend, needed, op)?;
        self.refresh(backend, handle, needed).map(Cow::Owned)
    }

    /// A refresh restores at most `max_level` levels.
    fn check_reachable<B: Backend>(backend: &B, needed: usize, op: &'static str) -> StatResult<()> {
        let available = backend.params().max_level;
        if needed > available {
            return Err(StatError::InsufficientLevel {
                op,
                needed,
                available,
            });
        }
        Ok(())
    }
}
