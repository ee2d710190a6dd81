//! Logical encrypted vector spread over one or more containers.

/// An encrypted vector of `size` logical values packed into containers of
/// `max_slots` slots each.
///
/// All containers share level and scale once an operation has completed.
/// `tail_clean` records whether the unused slots after `size` are known to
/// decrypt to zero; reductions mask them otherwise. Cloning copies every
/// container.
#[derive(Clone, Debug)]
pub struct VectorHandle<C> {
    containers: Vec<C>,
    size: usize,
    level: usize,
    scale: f64,
    tail_clean: bool,
}

impl<C> VectorHandle<C> {
    pub(crate) fn from_parts(
        containers: Vec<C>,
        size: usize,
        level: usize,
        scale: f64,
        tail_clean: bool,
    ) -> Self {
        Self {
            containers,
            size,
            level,
            scale,
            tail_clean,
        }
    }

    /// Containers in slot order.
    pub fn containers(&self) -> &[C] {
        &self.containers
    }

    /// Number of containers.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Logical value count.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Remaining levels.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Current encoding scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Whether the padding is known to decrypt to zero.
    pub fn tail_clean(&self) -> bool {
        self.tail_clean
    }

    /// Whether the last container holds slots past the logical end.
    pub fn has_padding(&self, max_slots: usize) -> bool {
        self.size < self.containers.len() * max_slots
    }

    /// Whether a reduction over this vector must mask the padding first.
    pub fn needs_mask(&self, max_slots: usize) -> bool {
        self.has_padding(max_slots) && !self.tail_clean
    }

    /// Container 0 alone, as a handle of at most one container's worth of
    /// values. Used on reduction results, whose containers all carry the
    /// same replicated value.
    #[must_use]
    pub fn select_one(&self, max_slots: usize) -> Self
    where
        C: Clone,
    {
        let size = self.size.min(max_slots);
        Self {
            containers: self.containers.iter().take(1).cloned().collect(),
            size,
            level: self.level,
            scale: self.scale,
            tail_clean: self.tail_clean || size == max_slots,
        }
    }

    /// Container 0 replicated `num` times under a new logical size.
    #[must_use]
    pub fn extend_to(&self, num: usize, size: usize) -> Self
    where
        C: Clone,
    {
        let containers = match self.containers.first() {
            Some(first) => vec![first.clone(); num],
            None => Vec::new(),
        };
        Self {
            containers,
            size,
            level: self.level,
            scale: self.scale,
            tail_clean: false,
        }
    }
}
