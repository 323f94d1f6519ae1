//! colbridge - Columnar UDF evaluation bridge
//!
//! Bridges row-oriented in-process data and an out-of-process worker that
//! evaluates user-defined functions over columnar batches: read-only column
//! vectors, argument planning over chained UDFs, a spillable row
//! correlation queue, and the batched evaluation pipeline tying them
//! together.

pub mod error;
pub mod expr;
pub mod memory;
pub mod pipeline;
pub mod planner;
pub mod queue;
pub mod types;
pub mod vector;
pub mod worker;

pub use error::{BridgeError, Result};
pub use expr::{BinaryOp, Expr, UdfExpr};
pub use memory::{TaskContext, TaskMemoryManager};
pub use pipeline::{BatchEvalPipeline, PipelineState, RowStream, VecRowStream};
pub use planner::{ArgumentPlan, ChainedUdf, UdfStage};
pub use queue::{HybridRowQueue, QueueStats, DEFAULT_PAGE_SIZE};
pub use types::{DataType, Decimal, Field, Row, Schema, Value};
pub use vector::{BatchBuilder, ColumnBatch, ColumnBuilder, ColumnVector, ValidityBitmap};
pub use worker::{ChannelConfig, WorkerChannel, EVAL_MODE_COLUMNAR};
