use std::iter::FusedIterator;
use std::vec;

use super::combiner::Combiner;
use super::context::{ComputeContext, SetupContext};
use super::error::DynResult;
use super::vertex::VertexView;

/// Client-supplied vertex program.
///
/// `init` and `compute(empty)` run for every inner vertex at superstep 0.
/// From then on `compute` runs for every vertex that has not voted to halt,
/// or that received messages during the previous superstep. A program must
/// eventually vote to halt everywhere or the job never terminates.
pub trait VertexProgram<VD, MD>: Send + Sync {
    /// Called once per worker before superstep 0, the place to register
    /// aggregators.
    fn setup(&self, _ctx: &mut SetupContext<'_>) -> DynResult<()> {
        Ok(())
    }

    fn init(&self, vertex: VertexView<'_>, ctx: &mut ComputeContext<'_, VD, MD>) -> DynResult<()>;

    fn compute(
        &self,
        messages: Messages<MD>,
        vertex: VertexView<'_>,
        ctx: &mut ComputeContext<'_, VD, MD>,
    ) -> DynResult<()>;

    fn combiner(&self) -> Option<&dyn Combiner<MD>> {
        None
    }
}

/// Messages delivered to one vertex, consumed by iterating.
#[derive(Debug)]
pub struct Messages<MD> {
    inner: vec::IntoIter<MD>,
}

impl<MD> Messages<MD> {
    pub fn new(messages: Vec<MD>) -> Self {
        Self {
            inner: messages.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl<MD> Iterator for Messages<MD> {
    type Item = MD;

    fn next(&mut self) -> Option<MD> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<MD> ExactSizeIterator for Messages<MD> {}
impl<MD> FusedIterator for Messages<MD> {}
