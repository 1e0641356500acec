//! Collective communication abstraction for `executeStepParallel`.
//!
//! The filter never talks to a transport directly: it only calls
//! [`CollectiveComm::gather`] and [`CollectiveComm::broadcast`]. This keeps
//! the step logic testable without a real multi-process environment — the
//! in-process implementation below simulates q ranks as q OS threads inside
//! one process, which is what the parallel-equivalence test in `tests/`
//! exercises. A real multi-process deployment can instead implement this
//! trait over an actual MPI communicator (see the optional `mpi` feature).

use std::sync::{Arc, Barrier, Mutex};

use crate::error::Result;

/// Abstracts the two collective operations the parallel step needs.
pub trait CollectiveComm {
    /// This participant's rank within the communicator.
    fn rank(&self) -> usize;

    /// Total number of participants in the communicator.
    fn size(&self) -> usize;

    /// Gathers `column` from every rank into a single, rank-ordered,
    /// flattened buffer on `root`. Returns `Some(buffer)` on `root`, `None`
    /// elsewhere.
    fn gather(&self, column: &[f64], root: usize) -> Result<Option<Vec<f64>>>;

    /// Broadcasts `buffer` from `root` to every participant, overwriting it
    /// in place on non-root ranks.
    fn broadcast(&self, buffer: &mut Vec<f64>, root: usize) -> Result<()>;
}

/// A [`CollectiveComm`] simulating `size` ranks as threads within one
/// process. Used by tests and by single-process deployments that still want
/// to exercise the parallel code path.
#[derive(Clone)]
pub struct InProcessComm {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    gather_staging: Arc<Mutex<Vec<Vec<f64>>>>,
    bcast_staging: Arc<Mutex<Vec<f64>>>,
}

impl InProcessComm {
    /// Builds one handle per rank of a `size`-participant in-process
    /// communicator; hand one handle to each worker thread.
    pub fn cluster(size: usize) -> Vec<InProcessComm> {
        let barrier = Arc::new(Barrier::new(size));
        let gather_staging = Arc::new(Mutex::new(vec![Vec::new(); size]));
        let bcast_staging = Arc::new(Mutex::new(Vec::new()));
        (0..size)
            .map(|rank| InProcessComm {
                rank,
                size,
                barrier: barrier.clone(),
                gather_staging: gather_staging.clone(),
                bcast_staging: bcast_staging.clone(),
            })
            .collect()
    }
}

impl CollectiveComm for InProcessComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn gather(&self, column: &[f64], root: usize) -> Result<Option<Vec<f64>>> {
        {
            let mut staging = self.gather_staging.lock().unwrap();
            staging[self.rank] = column.to_vec();
        }
        self.barrier.wait();
        let result = if self.rank == root {
            let staging = self.gather_staging.lock().unwrap();
            Some(staging.iter().flatten().copied().collect())
        } else {
            None
        };
        // Second rendezvous: make sure every rank has finished reading
        // `gather_staging` before the next call overwrites it.
        self.barrier.wait();
        Ok(result)
    }

    fn broadcast(&self, buffer: &mut Vec<f64>, root: usize) -> Result<()> {
        if self.rank == root {
            *self.bcast_staging.lock().unwrap() = buffer.clone();
        }
        self.barrier.wait();
        let data = self.bcast_staging.lock().unwrap().clone();
        *buffer = data;
        self.barrier.wait();
        Ok(())
    }
}

/// Lets every participant learn whether *any* rank's local operator call
/// failed, and at which sigma column, before the step decides whether to
/// go on gathering/broadcasting the actual propagated columns.
///
/// Every rank must call this exactly once per step regardless of its own
/// `local_failure`, and must keep calling the same sequence of collectives
/// afterwards in lockstep — skipping it on a failing rank would leave every
/// other rank blocked forever on the next `gather`/`broadcast`, since
/// [`InProcessComm`] rendezvouses all `size` ranks at a shared barrier.
pub(crate) fn exchange_failure(
    local_failure: Option<usize>,
    world: &dyn CollectiveComm,
    masters: Option<&dyn CollectiveComm>,
    q: usize,
) -> Result<Option<usize>> {
    let flag = [
        if local_failure.is_some() { 1.0 } else { 0.0 },
        local_failure.unwrap_or(0) as f64,
    ];
    let mut flat = vec![0.0; 2 * q];
    if let Some(masters_comm) = masters {
        if let Some(gathered) = masters_comm.gather(&flag, 0)? {
            flat = gathered;
        }
    }
    world.broadcast(&mut flat, 0)?;

    for i in 0..q {
        if flat[2 * i] > 0.5 {
            return Ok(Some(flat[2 * i + 1] as usize));
        }
    }
    Ok(None)
}

#[cfg(feature = "mpi-comm")]
pub mod mpi_backed {
    //! A [`CollectiveComm`] implementation backed by a real MPI communicator,
    //! via the `mpi` crate. Only compiled with `--features mpi-comm`.

    use super::{CollectiveComm, Result};
    use mpi::collective::SystemOperation;
    use mpi::topology::Communicator;
    use mpi::traits::*;

    pub struct MpiComm<'a, C: Communicator> {
        comm: &'a C,
    }

    impl<'a, C: Communicator> MpiComm<'a, C> {
        pub fn new(comm: &'a C) -> Self {
            MpiComm { comm }
        }
    }

    impl<'a, C: Communicator> CollectiveComm for MpiComm<'a, C> {
        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn gather(&self, column: &[f64], root: usize) -> Result<Option<Vec<f64>>> {
            let root_process = self.comm.process_at_rank(root as i32);
            if self.rank() == root {
                let mut buf = vec![0.0; column.len() * self.size()];
                root_process.gather_into_root(column, &mut buf);
                Ok(Some(buf))
            } else {
                root_process.gather_into(column);
                Ok(None)
            }
        }

        fn broadcast(&self, buffer: &mut Vec<f64>, root: usize) -> Result<()> {
            let root_process = self.comm.process_at_rank(root as i32);
            root_process.broadcast_into(buffer);
            Ok(())
        }
    }

    // `SystemOperation` is re-exported so downstream code wiring up a real
    // reduction alongside gather/broadcast doesn't need a separate `mpi` dep.
    pub use SystemOperation as ReductionOp;
}
