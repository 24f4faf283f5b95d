//! Task graphs: spawn tile-level units with priority hints, join at one barrier

use super::client::CpuClient;
use crate::error::{Error, Result};
use crate::tile::TileIndex;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::sync::OnceLock;

/// Records the first error raised by any unit of a task graph
///
/// Later errors are dropped; which of several concurrent failures wins is
/// unspecified.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    first: OnceLock<Error>,
}

impl ErrorSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless an error is already recorded.
    /// Returns true if this call filled the slot.
    pub fn record(&self, err: Error) -> bool {
        let mut filled = false;
        self.first.get_or_init(|| {
            filled = true;
            err
        });
        filled
    }

    /// Record the error of `result`, if any
    pub fn capture(&self, result: Result<()>) {
        if let Err(err) = result {
            log::debug!("task unit failed: {}", err);
            self.record(err);
        }
    }

    /// Whether an error was recorded
    pub fn is_set(&self) -> bool {
        self.first.get().is_some()
    }

    /// `Err` with the recorded error, `Ok` when every unit succeeded
    pub fn into_result(self) -> Result<()> {
        match self.first.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// How a set of tile-level units is mapped onto host tasks
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Schedule {
    /// One task per unit
    #[default]
    TaskPerUnit,
    /// One task running a flattened parallel loop over all cells
    FlattenedCells,
}

type UnitFn<'s> = Box<dyn FnOnce() -> Result<()> + Send + 's>;
type CellFn<'s> = Box<dyn Fn(usize, usize) -> Result<()> + Send + Sync + 's>;

enum Task<'s> {
    Unit(UnitFn<'s>),
    Cells { cells: Vec<TileIndex>, body: CellFn<'s> },
}

/// Units of work for one dispatcher call
///
/// Units are spawned highest priority first and joined by [`TaskGraph::wait`].
/// A failing unit never stops its siblings.
#[derive(Default)]
pub struct TaskGraph<'s> {
    tasks: Vec<(i32, Task<'s>)>,
}

impl<'s> TaskGraph<'s> {
    /// Empty graph
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Add one unit
    pub fn spawn<F>(&mut self, priority: i32, unit: F)
    where
        F: FnOnce() -> Result<()> + Send + 's,
    {
        self.tasks.push((priority, Task::Unit(Box::new(unit))));
    }

    /// Add `cells` under `schedule`: one task per cell, or one task that
    /// loops over all cells in parallel
    pub fn spawn_cells<F>(&mut self, priority: i32, schedule: Schedule, cells: Vec<TileIndex>, body: F)
    where
        F: Fn(usize, usize) -> Result<()> + Send + Sync + Clone + 's,
    {
        if cells.is_empty() {
            return;
        }
        match schedule {
            Schedule::TaskPerUnit => {
                for (i, j) in cells {
                    let body = body.clone();
                    self.spawn(priority, move || body(i, j));
                }
            }
            Schedule::FlattenedCells => {
                self.tasks.push((
                    priority,
                    Task::Cells {
                        cells,
                        body: Box::new(body),
                    },
                ));
            }
        }
    }

    /// Number of spawned tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing was spawned
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task on the host pool and wait for all of them.
    ///
    /// Returns the first recorded unit error, after all units finished.
    pub fn wait(self, client: &CpuClient) -> Result<()> {
        let mut tasks = self.tasks;
        if tasks.is_empty() {
            return Ok(());
        }
        tasks.sort_by_key(|(priority, _)| Reverse(*priority));

        let slot = ErrorSlot::new();
        let min_len = client.rayon_min_len();
        client.install_parallelism(|| {
            rayon::scope_fifo(|scope| {
                for (_, task) in tasks {
                    let slot = &slot;
                    scope.spawn_fifo(move |_| match task {
                        Task::Unit(unit) => slot.capture(unit()),
                        Task::Cells { cells, body } => {
                            cells
                                .into_par_iter()
                                .with_min_len(min_len)
                                .for_each(|(i, j)| slot.capture(body(i, j)));
                        }
                    });
                }
            });
        });
        slot.into_result()
    }
}
