pub mod error;
pub use self::error::{DynError, DynResult, Error, Result};

pub mod value;
pub use self::value::{Aggregatable, Type, Value};

pub mod reduce;
pub use reduce::{AggregatorKind, Reducer};

pub mod aggregator;
pub use aggregator::{AggregatorCell, AggregatorRegistry, LocalAggregates};

pub mod graph;
pub use graph::{
    Edge, EdgeCutFragment, Fid, Fragment, Gid, GraphBuilder, LabelId, ModuloPartitioner, Oid,
    Partitioner, Vertex, VertexRange, Weight,
};

pub mod vertex;
pub use vertex::VertexView;

pub mod context;
pub use context::{ComputeContext, SetupContext, WorkerContext};

pub mod combiner;
pub use combiner::{Combiner, MaxCombiner, MinCombiner, SumCombiner};

pub mod program;
pub use program::{Messages, VertexProgram};

pub mod config;
pub use config::{Config, JobConfig};

mod mailbox;

pub mod transport;
pub use transport::{
    channel_mesh, AbortSignal, ChannelMessageManager, LocalMessageManager, MessageManager,
};

pub mod driver;
pub use driver::{StepOutcome, SuperstepDriver, Traversal};

pub mod worker;
pub use worker::{run_local, run_parallel, write_outputs, Worker, WorkerResult};
