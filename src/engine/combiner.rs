use std::marker::PhantomData;
use std::ops::Add;

use super::error::{DynResult, Error};

/// Pre-transmission reduction of all messages addressed to one vertex.
///
/// The engine invokes a combiner once per destination with at least one
/// message, on every worker flush and never globally, so the reduction must
/// be associative and commutative. A single message is combined too.
pub trait Combiner<MD>: Send + Sync {
    fn combine(&self, messages: Vec<MD>) -> DynResult<MD>;
}

impl<MD, F> Combiner<MD> for F
where
    F: Fn(Vec<MD>) -> MD + Send + Sync,
{
    fn combine(&self, messages: Vec<MD>) -> DynResult<MD> {
        Ok(self(messages))
    }
}

fn reduce_non_empty<MD>(messages: Vec<MD>, f: impl FnMut(MD, MD) -> MD) -> DynResult<MD> {
    messages
        .into_iter()
        .reduce(f)
        .ok_or_else(|| Error::EmptyCombine.into())
}

pub struct SumCombiner<MD>(PhantomData<fn(MD) -> MD>);

impl<MD> SumCombiner<MD> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<MD> Default for SumCombiner<MD> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MD: Add<Output = MD>> Combiner<MD> for SumCombiner<MD> {
    fn combine(&self, messages: Vec<MD>) -> DynResult<MD> {
        reduce_non_empty(messages, |a, b| a + b)
    }
}

pub struct MinCombiner<MD>(PhantomData<fn(MD) -> MD>);

impl<MD> MinCombiner<MD> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<MD> Default for MinCombiner<MD> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MD: PartialOrd> Combiner<MD> for MinCombiner<MD> {
    fn combine(&self, messages: Vec<MD>) -> DynResult<MD> {
        reduce_non_empty(messages, |a, b| if b < a { b } else { a })
    }
}

pub struct MaxCombiner<MD>(PhantomData<fn(MD) -> MD>);

impl<MD> MaxCombiner<MD> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<MD> Default for MaxCombiner<MD> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MD: PartialOrd> Combiner<MD> for MaxCombiner<MD> {
    fn combine(&self, messages: Vec<MD>) -> DynResult<MD> {
        reduce_non_empty(messages, |a, b| if b > a { b } else { a })
    }
}
