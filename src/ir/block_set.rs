//! Dense sets and maps keyed by basic-block index.

/// A dense set of basic-block indices.
///
/// Backed by a bool vector with a cached count and a rotating cursor:
/// [`BlockSet::take`] resumes scanning where the previous call stopped,
/// which keeps the worklist loops of the lifter cheap.
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    idx: usize,
    values: Vec<bool>,
    count: usize,
}

impl BlockSet {
    pub fn new(size: usize) -> Self {
        Self {
            idx: 0,
            values: vec![false; size],
            count: 0,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn has(&self, b: usize) -> bool {
        self.values.get(b).copied().unwrap_or(false)
    }

    /// Add `b`, returning whether the set changed.
    pub fn add(&mut self, b: usize) -> bool {
        if self.values[b] {
            return false;
        }
        self.count += 1;
        self.values[b] = true;
        self.idx = b;
        true
    }

    pub fn clear(&mut self) {
        for v in &mut self.values {
            *v = false;
        }
        self.count = 0;
    }

    /// Replace the contents with those of `other`.
    pub fn copy_from(&mut self, other: &BlockSet) {
        self.values.copy_from_slice(&other.values);
        self.count = other.count;
    }

    /// Remove and return an arbitrary member, or `None` if empty. Scanning
    /// resumes from the position of the last result.
    pub fn take(&mut self) -> Option<usize> {
        for i in self.idx..self.values.len() {
            if self.values[i] {
                self.values[i] = false;
                self.idx = i;
                self.count -= 1;
                return Some(i);
            }
        }
        for i in 0..self.idx {
            if self.values[i] {
                self.values[i] = false;
                self.idx = i;
                self.count -= 1;
                return Some(i);
            }
        }
        None
    }
}
