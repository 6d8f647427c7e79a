use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::base::Base;

/// Hash-map key comparing base values bit for bit.
#[derive(Clone, Copy)]
struct BitKey<B>(B);

impl<B: Base> Hash for BitKey<B> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_bits(state);
    }
}

impl<B: Base> PartialEq for BitKey<B> {
    fn eq(&self, other: &Self) -> bool {
        self.0.identical(&other.0)
    }
}

impl<B: Base> Eq for BitKey<B> {}

/// Constants referenced by a recording, deduplicated by bit pattern.
#[derive(Clone)]
pub(crate) struct ConstantPool<B> {
    values: Vec<B>,
    index: HashMap<BitKey<B>, u32>,
}

impl<B: Base> ConstantPool<B> {
    pub(crate) fn new() -> Self {
        ConstantPool {
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Pool index of `value`, adding it if no identical constant exists.
    pub(crate) fn intern(&mut self, value: B) -> u32 {
        let next = self.values.len() as u32;
        let idx = *self.index.entry(BitKey(value)).or_insert(next);
        if idx == next {
            self.values.push(value);
        }
        idx
    }

    pub(crate) fn into_values(self) -> Vec<B> {
        self.values
    }
}
