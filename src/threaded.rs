use crate::journal::{Journal, JournalReader};
use crate::stage::Stage;
use crate::workers::WorkerPool;
use bytemuck::Pod;
use std::io;
use std::thread;
use std::time::Duration;

/// Stages on their own threads, chained by journals.
///
/// Every stage has exactly one worker, so items leave in the order they were sent
/// and a stateful stage never sees two items at once.
pub struct ThreadedPipeline<In: Pod + Send + 'static, Out: Pod + Send + 'static> {
    workers: WorkerPool,
    input: Journal<In>,
    output: JournalReader<Out>,
    default_capacity: usize,
}

impl<T: Pod + Send + 'static> ThreadedPipeline<T, T> {
    /// A pipeline with no stages yet. `capacity` bounds every journal, input included.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        Self::with_workers(WorkerPool::new(), capacity)
    }

    /// Like [`ThreadedPipeline::with_capacity`] on a pre-configured pool.
    pub fn with_workers(workers: WorkerPool, capacity: usize) -> io::Result<Self> {
        let input = Journal::anonymous(capacity, workers.op_counter())?;
        let output = input.reader();
        Ok(Self {
            workers,
            input,
            output,
            default_capacity: capacity,
        })
    }
}

impl<In: Pod + Send + 'static, Out: Pod + Send + 'static> ThreadedPipeline<In, Out> {
    pub fn add_stage<Next, S>(self, stage: S) -> io::Result<ThreadedPipeline<In, Next>>
    where
        Next: Pod + Send + 'static,
        S: Stage<Out, Next> + Send + 'static,
    {
        let capacity = self.default_capacity;
        self.add_stage_with_capacity(capacity, stage)
    }

    /// Spawns a worker that feeds the current tail through `stage` into a new journal.
    pub fn add_stage_with_capacity<Next, S>(
        mut self,
        capacity: usize,
        mut stage: S,
    ) -> io::Result<ThreadedPipeline<In, Next>>
    where
        Next: Pod + Send + 'static,
        S: Stage<Out, Next> + Send + 'static,
    {
        let mut next = Journal::<Next>::anonymous(capacity, self.workers.op_counter())?;
        let next_reader = next.reader();
        let reader = self.output;

        self.workers.run_worker(move || {
            let mut did_work = false;
            while reader.next() {
                did_work = true;
                reader.with(|item| stage.process(item, &mut |out: &Next| next.append(out)));
            }
            did_work
        })?;

        Ok(ThreadedPipeline {
            workers: self.workers,
            input: self.input,
            output: next_reader,
            default_capacity: self.default_capacity,
        })
    }

    /// Single producer entry point.
    pub fn send(&mut self, item: &In) {
        self.input.append(item);
    }

    /// Polls until an item reaches the end of the pipeline.
    ///
    /// # Panics
    /// Panics if a stage worker died, since nothing further can arrive.
    pub fn receive(&self) -> Out {
        loop {
            if let Some(item) = self.try_receive() {
                return item;
            }
            if self.workers.is_any_worker_panicked() {
                panic!("pipeline worker panicked, no further output");
            }
            thread::yield_now();
        }
    }

    pub fn try_receive(&self) -> Option<Out> {
        if self.output.next() {
            return self.output.get();
        }
        None
    }

    /// Items published at the tail, consumed or not.
    pub fn output_size(&self) -> usize {
        self.output.size()
    }

    pub fn sent(&self) -> usize {
        self.input.len()
    }

    pub fn capacity(&self) -> usize {
        self.input.capacity()
    }

    /// No further `send` fits in the input journal.
    pub fn is_full(&self) -> bool {
        self.sent() >= self.capacity()
    }

    pub fn await_idle(&self, timeout: Duration) {
        self.workers.await_idle(timeout);
    }

    pub fn is_broken(&self) -> bool {
        self.workers.is_any_worker_panicked()
    }
}
