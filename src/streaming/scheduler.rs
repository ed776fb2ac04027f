//! Concurrent chunk generation against one shared, non-reentrant pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::core::error::Error;
use crate::terrain::chunk::ChunkCoordinate;

/// The seam the scheduler drives. Implemented by
/// [`GenerationContext`](crate::generation::GenerationContext); tests drive
/// the locking discipline through an instrumented fake.
pub trait ChunkPipeline: Send + 'static {
    type Chunk: Send + 'static;

    /// Generate one chunk. Callers must hold the pipeline's exclusive lock
    /// for the entire call; the pipeline mutates shared device buffers in
    /// place.
    fn generate_chunk(&mut self, coord: ChunkCoordinate) -> Result<Self::Chunk, Error>;

    /// Release a finished chunk's resources during unload.
    fn dispose_chunk(&mut self, _chunk: &mut Self::Chunk) {}

    /// Release the pipeline's own resources at teardown.
    fn dispose(&mut self) {}
}

/// Schedules one worker task per requested chunk coordinate.
///
/// All workers share one pipeline behind a mutex, so at most one generation
/// is ever in flight on the device; the loaded-chunk list has its own lock
/// for the brief append at the end of each task.
///
/// Lock order is fixed: the pipeline lock is taken first and never while the
/// loaded-list lock is held. Workers release the pipeline lock before
/// appending, so the two are normally never nested at all.
pub struct ChunkScheduler<P: ChunkPipeline> {
    pipeline: Arc<Mutex<P>>,
    loaded: Arc<Mutex<Vec<P::Chunk>>>,
    tasks: HashMap<ChunkCoordinate, JoinHandle<()>>,
    runtime: Runtime,
}

impl<P: ChunkPipeline> ChunkScheduler<P> {
    pub fn new(pipeline: P) -> Result<Self, Error> {
        Ok(Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            loaded: Arc::new(Mutex::new(Vec::new())),
            tasks: HashMap::new(),
            runtime: Runtime::new()?,
        })
    }

    /// Request generation of one chunk.
    ///
    /// Returns `false` if the coordinate is already in flight. A failed task
    /// is logged and forgotten; the coordinate stays ungenerated until it is
    /// requested again.
    pub fn request(&mut self, coord: ChunkCoordinate) -> bool {
        if self.tasks.contains_key(&coord) {
            return false;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let loaded = Arc::clone(&self.loaded);
        let handle = self.runtime.spawn_blocking(move || {
            let result = {
                let mut pipeline = pipeline.lock().unwrap();
                pipeline.generate_chunk(coord)
            };
            match result {
                Ok(chunk) => loaded.lock().unwrap().push(chunk),
                Err(e) => log::error!("chunk {} generation failed: {}", coord, e),
            }
        });
        self.tasks.insert(coord, handle);
        true
    }

    /// Per-tick poll: drop handles of tasks that have run to completion.
    /// Finished tasks are simply forgotten, never joined; running tasks are
    /// never cancelled.
    pub fn update(&mut self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Number of tasks still in flight (as of the last `update`).
    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_pending(&self, coord: ChunkCoordinate) -> bool {
        self.tasks.contains_key(&coord)
    }

    /// Shared handle to the loaded-chunk list.
    pub fn loaded(&self) -> Arc<Mutex<Vec<P::Chunk>>> {
        Arc::clone(&self.loaded)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.lock().unwrap().len()
    }

    /// Block until every in-flight task has completed.
    ///
    /// Must be called before teardown: disposing the pipeline while tasks
    /// are still pending is undefined.
    pub fn drain(&mut self) {
        while !self.tasks.is_empty() {
            self.update();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Dispose every loaded chunk. Pipeline lock first, then the list lock,
    /// per the fixed order.
    pub fn unload_all(&mut self) {
        let mut pipeline = self.pipeline.lock().unwrap();
        let chunks = std::mem::take(&mut *self.loaded.lock().unwrap());
        for mut chunk in chunks {
            pipeline.dispose_chunk(&mut chunk);
        }
    }

    /// Tear down: wait for pending tasks, dispose all chunks, then dispose
    /// the pipeline itself.
    pub fn shutdown(mut self) {
        self.drain();
        self.unload_all();
        self.pipeline.lock().unwrap().dispose();
    }
}
