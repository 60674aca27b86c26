use super::{Fid, Oid};

pub trait Shard {
    fn shard(&self) -> u64;

    #[allow(clippy::cast_possible_truncation)]
    fn shard_as_usize(&self) -> usize {
        self.shard() as usize
    }
}

impl Shard for Oid {
    fn shard(&self) -> u64 {
        *self
    }
}

/// Decides which fragment owns a vertex.
pub trait Partitioner: Send + Sync {
    fn fnum(&self) -> usize;

    fn fragment_of(&self, oid: Oid) -> Fid;
}

#[derive(Debug, Clone, Copy)]
pub struct ModuloPartitioner {
    fnum: usize,
}

impl ModuloPartitioner {
    pub fn new(fnum: usize) -> Self {
        assert!(fnum > 0, "can't partition into zero fragments");
        Self { fnum }
    }
}

impl Partitioner for ModuloPartitioner {
    fn fnum(&self) -> usize {
        self.fnum
    }

    fn fragment_of(&self, oid: Oid) -> Fid {
        oid.shard_as_usize() % self.fnum
    }
}
