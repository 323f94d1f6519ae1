//! Batched evaluation pipeline bridging rows to the external worker.
//!
//! One pipeline processes one partition on one task thread: upstream rows
//! are snapshotted into the correlation queue and projected into columnar
//! batches; batches ship to the worker channel; result rows are paired
//! positionally with dequeued originals to form the output stream.
//!
//! The pipeline blocks only while waiting on the channel or on spill I/O;
//! there is no other work for the task thread to do meanwhile.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::expr::UdfExpr;
use crate::memory::TaskContext;
use crate::planner::ArgumentPlan;
use crate::queue::{HybridRowQueue, QueueStats};
use crate::types::{DataType, Row, Schema, Value};
use crate::vector::{BatchBuilder, ColumnBatch};
use crate::worker::{ChannelConfig, WorkerChannel};

/// A pull-driven stream of rows.
pub trait RowStream {
    /// Returns the next row, or None if exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if producing the row fails.
    fn next(&mut self) -> Result<Option<Row>>;
}

/// A [`RowStream`] over an in-memory row vector.
pub struct VecRowStream {
    rows: std::vec::IntoIter<Row>,
}

impl VecRowStream {
    /// Creates a stream over the given rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        VecRowStream {
            rows: rows.into_iter(),
        }
    }
}

impl RowStream for VecRowStream {
    fn next(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}

/// Pipeline lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed; no rows consumed yet.
    Idle,
    /// Consuming upstream rows and sending batches.
    Streaming,
    /// Pairing result rows with queued originals.
    Draining,
    /// Fully drained, failed, or aborted; resources released.
    Closed,
}

/// Evaluates external user-defined functions over a partition's rows.
pub struct BatchEvalPipeline<C: WorkerChannel> {
    state: PipelineState,
    plan: ArgumentPlan,
    config: ChannelConfig,
    ctx: Arc<TaskContext>,
    upstream: Box<dyn RowStream>,
    channel: C,
    queue: Arc<Mutex<HybridRowQueue>>,
    builder: BatchBuilder,
    output_schema: Schema,
    rows_sent: u64,
    rows_received: u64,
    /// Result batch currently being drained, with the next row index.
    current: Option<(ColumnBatch, usize)>,
}

impl<C: WorkerChannel> BatchEvalPipeline<C> {
    /// Creates a pipeline for one partition.
    ///
    /// The correlation queue's release is registered as a completion hook
    /// on `ctx`, so it runs even if the task is torn down mid-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if argument planning fails or the flattened input
    /// schema is not buildable.
    pub fn new(
        upstream: Box<dyn RowStream>,
        upstream_schema: &Schema,
        udfs: &[UdfExpr],
        config: ChannelConfig,
        ctx: Arc<TaskContext>,
        channel: C,
    ) -> Result<Self> {
        let input_types: Vec<DataType> = upstream_schema
            .iter()
            .map(|f| f.data_type.clone())
            .collect();
        let plan = ArgumentPlan::build(udfs, &input_types)?;
        let builder = BatchBuilder::new(plan.input_schema.clone())?;
        let output_schema = upstream_schema.concat(&plan.output_schema);

        let queue = Arc::new(Mutex::new(HybridRowQueue::new(Arc::clone(&ctx))));
        let hook_queue = Arc::clone(&queue);
        ctx.on_completion(move || {
            let _ = hook_queue.lock().close();
        });

        Ok(BatchEvalPipeline {
            state: PipelineState::Idle,
            plan,
            config,
            ctx,
            upstream,
            channel,
            queue,
            builder,
            output_schema,
            rows_sent: 0,
            rows_received: 0,
            current: None,
        })
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the argument plan in use.
    #[must_use]
    pub fn plan(&self) -> &ArgumentPlan {
        &self.plan
    }

    /// Returns the output row layout: original columns followed by one
    /// computed column per chain.
    #[must_use]
    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Returns correlation queue statistics.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.lock().stats()
    }

    /// Aborts the pipeline: cancels in-flight channel work and releases
    /// the queue. Idempotent.
    pub fn abort(&mut self) {
        if self.state == PipelineState::Closed {
            return;
        }
        debug!(task_id = self.ctx.task_id(), "pipeline aborted");
        self.channel.cancel();
        let _ = self.queue.lock().close();
        self.state = PipelineState::Closed;
    }

    fn advance(&mut self) -> Result<Option<Row>> {
        loop {
            match self.state {
                PipelineState::Idle => self.state = PipelineState::Streaming,
                PipelineState::Streaming => {
                    self.stream_all()?;
                    self.state = PipelineState::Draining;
                }
                PipelineState::Draining => return self.drain_next(),
                PipelineState::Closed => return Ok(None),
            }
        }
    }

    /// Consumes the entire upstream, enqueueing originals and shipping
    /// projected batches.
    fn stream_all(&mut self) -> Result<()> {
        while let Some(row) = self.upstream.next()? {
            self.queue.lock().add(&row)?;
            let projected: Vec<Value> = self
                .plan
                .input_exprs
                .iter()
                .map(|expr| expr.eval(&row))
                .collect::<Result<_>>()?;
            self.builder.append_row(&projected)?;
            if self.builder.len() >= self.config.max_rows_per_batch {
                self.flush_batch()?;
            }
        }
        if !self.builder.is_empty() {
            self.flush_batch()?;
        }
        self.channel.finish()?;
        debug!(
            task_id = self.ctx.task_id(),
            rows_sent = self.rows_sent,
            "upstream exhausted, draining worker results"
        );
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<()> {
        let full = std::mem::replace(
            &mut self.builder,
            BatchBuilder::new(self.plan.input_schema.clone())?,
        );
        let batch = full.finish()?;
        self.rows_sent += batch.num_rows() as u64;
        debug!(
            task_id = self.ctx.task_id(),
            rows = batch.num_rows(),
            "sending batch to worker"
        );
        self.channel.send(batch)
    }

    /// Yields the next joined output row, pulling result batches as
    /// needed.
    fn drain_next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some((batch, index)) = &mut self.current {
                if *index < batch.num_rows() {
                    let computed = batch.row_values(*index);
                    *index += 1;
                    self.rows_received += 1;
                    let original = self.queue.lock().remove()?;
                    return Ok(Some(original.concat(computed)));
                }
                if let Some((mut exhausted, _)) = self.current.take() {
                    exhausted.close();
                }
            }
            match self.channel.recv()? {
                Some(batch) => {
                    self.check_result_schema(&batch)?;
                    self.current = Some((batch, 0));
                }
                None => {
                    self.finish_drain()?;
                    return Ok(None);
                }
            }
        }
    }

    fn check_result_schema(&self, batch: &ColumnBatch) -> Result<()> {
        let expected: Vec<&DataType> =
            self.plan.output_schema.iter().map(|f| &f.data_type).collect();
        let actual: Vec<&DataType> = batch.schema().iter().map(|f| &f.data_type).collect();
        if expected != actual {
            return Err(BridgeError::WorkerError(format!(
                "result batch layout mismatch: expected {} columns of the declared \
                 output types, got {}",
                expected.len(),
                actual.len()
            )));
        }
        Ok(())
    }

    /// Verifies the 1:1 row contract and releases resources.
    fn finish_drain(&mut self) -> Result<()> {
        if self.rows_received != self.rows_sent {
            return Err(BridgeError::ProtocolViolation {
                message: "worker returned a different number of rows than were sent"
                    .to_string(),
                sent: self.rows_sent,
                returned: self.rows_received,
            });
        }
        let leftover = self.queue.lock().len();
        if leftover != 0 {
            return Err(BridgeError::ProtocolViolation {
                message: format!("{leftover} enqueued rows were never paired with a result"),
                sent: self.rows_sent,
                returned: self.rows_received,
            });
        }
        self.queue.lock().close()?;
        self.state = PipelineState::Closed;
        debug!(
            task_id = self.ctx.task_id(),
            rows = self.rows_received,
            "pipeline drained"
        );
        Ok(())
    }
}

impl<C: WorkerChannel> RowStream for BatchEvalPipeline<C> {
    /// Returns the next joined output row.
    ///
    /// Any failure aborts the pipeline: the channel is cancelled and the
    /// queue released before the error propagates.
    fn next(&mut self) -> Result<Option<Row>> {
        match self.advance() {
            Ok(row) => Ok(row),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }
}
