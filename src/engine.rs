//! Vector arithmetic over a [`Backend`].
//!
//! `HeEngine` lifts the per-container primitives to [`VectorHandle`]s:
//! it checks dimensions, aligns levels by dropping the higher operand,
//! pairs every multiplication with a rescale, and consults the
//! [`BootstrapScheduler`] before anything that consumes a level.

use std::borrow::Cow;

use num_integer::Integer;

use crate::{
    backend::Backend,
    error::{Context, SchemeError, StatError, StatResult},
    params::EngineParameters,
    refresh::BootstrapScheduler,
    vector::VectorHandle,
};

/// Vector handle over the containers of backend `B`.
pub type Handle<B> = VectorHandle<<B as Backend>::Ciphertext>;

/// Arithmetic on [`VectorHandle`]s, backed by a scheme and a refresh policy.
pub struct HeEngine<B: Backend> {
    backend: B,
    scheduler: BootstrapScheduler,
}

impl<B: Backend> HeEngine<B> {
    /// Engine whose scheduler follows the backend's bootstrapping flag.
    pub fn new(backend: B) -> Self {
        let scheduler = BootstrapScheduler::new(backend.params().bootstrapping);
        Self { backend, scheduler }
    }

    /// Underlying scheme.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Refresh policy.
    pub fn scheduler(&self) -> &BootstrapScheduler {
        &self.scheduler
    }

    /// Parameters of the underlying scheme.
    pub fn params(&self) -> &EngineParameters {
        self.backend.params()
    }

    /// Slots per container.
    pub fn max_slots(&self) -> usize {
        self.backend.max_slots()
    }

    /// Whether levels can be replenished.
    pub fn bootstrapping(&self) -> bool {
        self.scheduler.enabled()
    }

    /// Encrypts `values` into `ceil(len / max_slots)` containers.
    pub fn encrypt(&self, values: &[f64]) -> StatResult<Handle<B>> {
        if values.is_empty() {
            return Err(StatError::InvalidParameter("cannot encrypt an empty vector".into()));
        }
        let slots = self.max_slots();
        let count = Integer::div_ceil(&values.len(), &slots);
        let mut containers = Vec::with_capacity(count);
        for chunk in values.chunks(slots) {
            containers.push(self.backend.encrypt(chunk)?);
        }
        Ok(self.wrap(containers, values.len(), true))
    }

    /// Decrypts the logical values (padding dropped).
    pub fn decrypt(&self, h: &Handle<B>) -> Vec<f64> {
        let mut out: Vec<f64> = h
            .containers()
            .iter()
            .flat_map(|ct| self.backend.decrypt(ct))
            .collect();
        out.truncate(h.size());
        out
    }

    fn wrap(&self, containers: Vec<B::Ciphertext>, size: usize, tail_clean: bool) -> Handle<B> {
        let (level, scale) = containers.first().map_or(
            (self.params().max_level, self.params().default_scale()),
            |ct| (self.backend.level(ct), self.backend.scale(ct)),
        );
        VectorHandle::from_parts(containers, size, level, scale, tail_clean)
    }

    fn map(
        &self,
        h: &Handle<B>,
        f: impl Fn(&B::Ciphertext) -> Result<B::Ciphertext, SchemeError>,
    ) -> StatResult<Vec<B::Ciphertext>> {
        Ok(h.containers().iter().map(f).collect::<Result<Vec<_>, _>>()?)
    }

    fn zip(
        &self,
        a: &Handle<B>,
        b: &Handle<B>,
        f: impl Fn(&B::Ciphertext, &B::Ciphertext) -> Result<B::Ciphertext, SchemeError>,
    ) -> StatResult<Vec<B::Ciphertext>> {
        Ok(a.containers()
            .iter()
            .zip(b.containers())
            .map(|(x, y)| f(x, y))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn check_dims(op: &'static str, a: &Handle<B>, b: &Handle<B>) -> StatResult<()> {
        if a.container_count() != b.container_count() {
            return Err(StatError::DimensionMismatch {
                op,
                left: a.container_count(),
                right: b.container_count(),
            });
        }
        if a.size() != b.size() {
            return Err(StatError::DimensionMismatch {
                op,
                left: a.size(),
                right: b.size(),
            });
        }
        Ok(())
    }

    /// Moves every container of `h` down to `level`.
    pub fn drop_to(&self, h: &Handle<B>, level: usize) -> StatResult<Handle<B>> {
        let containers = self.map(h, |ct| self.backend.drop_level(ct, level))?;
        Ok(self.wrap(containers, h.size(), h.tail_clean()))
    }

    fn align<'a>(
        &self,
        a: &'a Handle<B>,
        b: &'a Handle<B>,
    ) -> StatResult<(Cow<'a, Handle<B>>, Cow<'a, Handle<B>>)> {
        Ok(match a.level().cmp(&b.level()) {
            std::cmp::Ordering::Greater => (Cow::Owned(self.drop_to(a, b.level())?), Cow::Borrowed(b)),
            std::cmp::Ordering::Less => (Cow::Borrowed(a), Cow::Owned(self.drop_to(b, a.level())?)),
            std::cmp::Ordering::Equal => (Cow::Borrowed(a), Cow::Borrowed(b)),
        })
    }

    /// Refreshes when bootstrapping is on and fewer than `needed` levels remain.
    pub fn ensure_level<'a>(
        &self,
        h: &'a Handle<B>,
        needed: usize,
        op: &'static str,
    ) -> StatResult<Cow<'a, Handle<B>>> {
        self.scheduler.ensure(&self.backend, h, needed, op)
    }

    /// Refreshes only when enabled and the level is below `depth`.
    pub fn refresh_below(&self, h: Handle<B>, depth: usize) -> StatResult<Handle<B>> {
        self.scheduler.refresh_below(&self.backend, h, depth)
    }

    /// Slotwise sum.
    pub fn add(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        Self::check_dims("add", a, b)?;
        let (a, b) = self.align(a, b)?;
        let containers = self.zip(&a, &b, |x, y| self.backend.add(x, y))?;
        Ok(self.wrap(containers, a.size(), a.tail_clean() && b.tail_clean()))
    }

    /// Slotwise difference.
    pub fn sub(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        Self::check_dims("sub", a, b)?;
        let (a, b) = self.align(a, b)?;
        let containers = self.zip(&a, &b, |x, y| self.backend.sub(x, y))?;
        Ok(self.wrap(containers, a.size(), a.tail_clean() && b.tail_clean()))
    }

    /// Slotwise product, consuming one level.
    pub fn mul(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        Self::check_dims("mul", a, b)?;
        let a = self.ensure_level(a, 1, "mul")?;
        let b = self.ensure_level(b, 1, "mul")?;
        let (a, b) = self.align(&a, &b)?;
        let containers = self.zip(&a, &b, |x, y| {
            self.backend.rescale(&self.backend.mul(x, y)?)
        })?;
        Ok(self.wrap(containers, a.size(), a.tail_clean() || b.tail_clean()))
    }

    /// `a²`, consuming one level.
    pub fn square(&self, a: &Handle<B>) -> StatResult<Handle<B>> {
        self.mul(a, a)
    }

    /// Product with a scalar, consuming one level.
    pub fn mul_const(&self, a: &Handle<B>, c: f64) -> StatResult<Handle<B>> {
        let a = self.ensure_level(a, 1, "mul_const")?;
        let containers = self.map(&a, |x| self.backend.rescale(&self.backend.mul_const(x, c)?))?;
        Ok(self.wrap(containers, a.size(), a.tail_clean()))
    }

    /// Adds `c` to every slot; the padding is no longer known to be zero.
    pub fn add_const(&self, a: &Handle<B>, c: f64) -> StatResult<Handle<B>> {
        if c == 0.0 {
            return Ok(a.clone());
        }
        let containers = self.map(a, |x| self.backend.add_const(x, c))?;
        Ok(self.wrap(containers, a.size(), false))
    }

    /// Subtracts `c` from every slot.
    pub fn sub_const(&self, a: &Handle<B>, c: f64) -> StatResult<Handle<B>> {
        self.add_const(a, -c)
    }

    /// Complex conjugate of every slot.
    pub fn conjugate(&self, a: &Handle<B>) -> StatResult<Handle<B>> {
        let containers = self.map(a, |x| self.backend.conjugate(x))?;
        Ok(self.wrap(containers, a.size(), a.tail_clean()))
    }

    /// Multiplies by `factor` and zeroes the padding of the last container.
    fn scale_and_mask(&self, a: &Handle<B>, factor: f64) -> StatResult<Handle<B>> {
        let a = self.ensure_level(a, 1, "mask")?;
        let slots = self.max_slots();
        let last = a.container_count().saturating_sub(1);
        let tail = a.size() - last * slots;
        let plain = vec![factor; tail];
        let mut containers = Vec::with_capacity(a.container_count());
        for (i, ct) in a.containers().iter().enumerate() {
            let scaled = if i == last {
                self.backend.mul_plain(ct, &plain)?
            } else {
                self.backend.mul_const(ct, factor)?
            };
            containers.push(self.backend.rescale(&scaled)?);
        }
        Ok(self.wrap(containers, a.size(), true))
    }

    /// Sum of all logical values, replicated into every slot of every
    /// container of the result.
    pub fn sum(&self, a: &Handle<B>) -> StatResult<Handle<B>> {
        let a = if a.needs_mask(self.max_slots()) {
            Cow::Owned(self.scale_and_mask(a, 1.0)?)
        } else {
            Cow::Borrowed(a)
        };
        let mut containers = a.containers().iter();
        let Some(first) = containers.next() else {
            return Err(StatError::InvalidParameter("sum of an empty vector".into()));
        };
        let mut total = first.clone();
        for ct in containers {
            total = self.backend.add(&total, ct)?;
        }
        let total = self.backend.inner_sum(&total)?;
        Ok(self.wrap(vec![total; a.container_count()], a.size(), false))
    }

    /// `Sum(v / denom)`; the division and any padding mask share one level.
    pub fn mean_with_denominator(&self, a: &Handle<B>, denom: f64) -> StatResult<Handle<B>> {
        if denom == 0.0 || !denom.is_finite() {
            return Err(StatError::InvalidParameter(format!("mean denominator {denom}")));
        }
        let scaled = if a.needs_mask(self.max_slots()) {
            self.scale_and_mask(a, 1.0 / denom)?
        } else {
            self.mul_const(a, 1.0 / denom)?
        };
        self.sum(&scaled)
    }

    /// `Sum(v / size)`.
    pub fn mean(&self, a: &Handle<B>) -> StatResult<Handle<B>> {
        self.mean_with_denominator(a, a.size() as f64)
    }

    /// `Sum(v² / d2) − Sum(v / d1)²`.
    pub fn variance_with_denominators(
        &self,
        a: &Handle<B>,
        d1: f64,
        d2: f64,
    ) -> StatResult<Handle<B>> {
        let mean_x = self.mean_with_denominator(a, d1).context("E[x]")?;
        let mean_x_sq = self.square(&mean_x).context("square of E[x]")?;
        let x_sq = self.square(a).context("x^2")?;
        let mean_sq = self.mean_with_denominator(&x_sq, d2).context("E[x^2]")?;
        self.sub(&mean_sq, &mean_x_sq).context("E[x^2] - E[x]^2")
    }

    /// Population variance.
    pub fn variance(&self, a: &Handle<B>) -> StatResult<Handle<B>> {
        let n = a.size() as f64;
        self.variance_with_denominators(a, n, n)
    }

    /// Narrows a reduction result to its first container.
    pub fn select_one(&self, a: &Handle<B>) -> Handle<B> {
        a.select_one(self.max_slots())
    }

    /// Replicates container 0 into `num` containers holding `size` values.
    pub fn extend_to(&self, a: &Handle<B>, num: usize, size: usize) -> Handle<B> {
        a.extend_to(num, size)
    }

    /// Broadcasts a reduced value to the container layout of `like`.
    pub fn broadcast_like(&self, value: &Handle<B>, like: &Handle<B>) -> Handle<B> {
        self.extend_to(value, like.container_count(), like.size())
    }
}
