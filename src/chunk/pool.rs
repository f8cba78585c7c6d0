use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use bevy::log::{debug, info, warn};
use crossbeam::channel::{self, Receiver, Sender};

use crate::error::WorkerError;

pub type JobId = u64;

/// A unit of work shipped to a pool thread. Jobs carry plain data only.
pub trait Job: Send + 'static {
    type Output: Send + 'static;

    fn operation(&self) -> &str;

    fn run(self) -> Self::Output;
}

type Callback<O> = Box<dyn FnOnce(Result<O, WorkerError>)>;

struct Assignment<J> {
    id: JobId,
    job: J,
}

struct Completion<O> {
    id: JobId,
    outcome: Result<O, WorkerError>,
}

/// Fixed set of OS threads pulling from one FIFO job channel.
///
/// A worker takes the next queued job as soon as it finishes the last one.
/// Completion callbacks run on the thread that calls [`WorkerPool::poll`] or
/// [`WorkerPool::wait_idle`], never on a worker. Dispatch is FIFO; completion
/// order across workers is not.
pub struct WorkerPool<J: Job> {
    handles: Vec<JoinHandle<()>>,
    jobs: Option<Sender<Assignment<J>>>,
    backlog: Receiver<Assignment<J>>,
    completions: Receiver<Completion<J::Output>>,
    callbacks: HashMap<JobId, Callback<J::Output>>,
    next_id: JobId,
}

impl<J: Job> WorkerPool<J> {
    pub fn new(size: usize) -> Result<Self, WorkerError> {
        let size = size.max(1);
        let (jobs_tx, jobs_rx) = channel::unbounded();
        let (done_tx, done_rx) = channel::unbounded();
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let jobs = jobs_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("terrain-worker-{index}"))
                .spawn(move || worker_loop(jobs, done))
                .map_err(|err| WorkerError::Spawn(err.to_string()))?;
            handles.push(handle);
        }

        info!("Started terrain worker pool with {} workers", size);

        Ok(Self {
            handles,
            jobs: Some(jobs_tx),
            backlog: jobs_rx,
            completions: done_rx,
            callbacks: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queues `job` for the next free worker.
    /// `on_complete` fires exactly once, from a later `poll` or `wait_idle`.
    pub fn enqueue<F>(&mut self, job: J, on_complete: F) -> JobId
    where
        F: FnOnce(Result<J::Output, WorkerError>) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let sent = match self.jobs.as_ref() {
            Some(jobs) => jobs.send(Assignment { id, job }).is_ok(),
            None => false,
        };
        if sent {
            self.callbacks.insert(id, Box::new(on_complete));
        } else {
            warn!("Terrain worker pool is shut down; dropping job {}", id);
            on_complete(Err(WorkerError::Stopped));
        }
        id
    }

    pub fn poll(&mut self) -> usize {
        let mut finished = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.finish(completion);
            finished += 1;
        }
        finished
    }

    /// Blocks until every enqueued job has finished and its callback has run.
    pub fn wait_idle(&mut self) {
        while !self.callbacks.is_empty() {
            match self.completions.recv() {
                Ok(completion) => self.finish(completion),
                Err(_) => {
                    warn!(
                        "Terrain worker pool stalled with {} jobs outstanding and no live workers",
                        self.callbacks.len()
                    );
                    return;
                }
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.backlog.len()
    }

    /// Jobs a worker has taken whose callback has not run yet.
    pub fn in_flight(&self) -> usize {
        self.callbacks.len().saturating_sub(self.queued())
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn finish(&mut self, completion: Completion<J::Output>) {
        let Completion { id, outcome } = completion;
        if let Err(err) = &outcome {
            warn!("Dropping terrain job: {}", err);
        }
        match self.callbacks.remove(&id) {
            Some(callback) => callback(outcome),
            None => debug!("Terrain job {} finished without a callback", id),
        }
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        let abandoned = self.backlog.try_iter().count();
        if abandoned > 0 {
            debug!("Abandoning {} queued terrain jobs", abandoned);
        }
        self.jobs.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop<J: Job>(jobs: Receiver<Assignment<J>>, done: Sender<Completion<J::Output>>) {
    for Assignment { id, job } in jobs.iter() {
        let operation = job.operation().to_owned();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || job.run())).map_err(|payload| {
            WorkerError::Panicked {
                job: id,
                operation,
                message: panic_message(payload.as_ref()),
            }
        });

        if done.send(Completion { id, outcome }).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    struct Square(u64);

    impl Job for Square {
        type Output = u64;

        fn operation(&self) -> &str {
            "square"
        }

        fn run(self) -> u64 {
            self.0 * self.0
        }
    }

    /// Holds its worker until `gate` yields, so tests can force completion order.
    struct Gated {
        id: u64,
        gate: Option<Receiver<()>>,
        started: Sender<u64>,
    }

    impl Job for Gated {
        type Output = u64;

        fn operation(&self) -> &str {
            "gated"
        }

        fn run(self) -> u64 {
            let _ = self.started.send(self.id);
            if let Some(gate) = self.gate {
                let _ = gate.recv_timeout(Duration::from_secs(10));
            }
            self.id * 10
        }
    }

    enum Flaky {
        Fine(u64),
        Explode,
    }

    impl Job for Flaky {
        type Output = u64;

        fn operation(&self) -> &str {
            match self {
                Flaky::Fine(_) => "fine",
                Flaky::Explode => "explode",
            }
        }

        fn run(self) -> u64 {
            match self {
                Flaky::Fine(value) => value,
                Flaky::Explode => panic!("mesh build blew up"),
            }
        }
    }

    #[test]
    fn single_worker_runs_jobs_in_submission_order() {
        let mut pool = WorkerPool::new(1).expect("pool");
        let seen = Rc::new(RefCell::new(Vec::new()));
        for value in 1..=5 {
            let seen = Rc::clone(&seen);
            pool.enqueue(Square(value), move |result| {
                seen.borrow_mut().push(result.expect("square"));
            });
        }
        assert_eq!(pool.len(), 5);
        pool.wait_idle();
        assert!(!pool.is_busy());
        assert_eq!(*seen.borrow(), vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn results_match_their_job_when_completion_is_out_of_order() {
        let mut pool = WorkerPool::new(3).expect("pool");
        let (gate_tx, gate_rx) = channel::bounded(1);
        let (started_tx, started_rx) = channel::unbounded();
        let results = Rc::new(RefCell::new(Vec::new()));

        let mut ids = HashMap::new();
        for id in 1..=3u64 {
            let gate = (id == 1).then(|| gate_rx.clone());
            let results = Rc::clone(&results);
            let job_id = pool.enqueue(
                Gated {
                    id,
                    gate,
                    started: started_tx.clone(),
                },
                move |result| results.borrow_mut().push((id, result.expect("gated"))),
            );
            ids.insert(job_id, id);
        }
        assert_eq!(ids.len(), 3);

        // Item 1 is parked; 2 and 3 must land first.
        while results.borrow().len() < 2 {
            pool.poll();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(results.borrow().iter().all(|(id, _)| *id != 1));

        gate_tx.send(()).expect("release gate");
        pool.wait_idle();

        let results = results.borrow();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2], (1, 10));
        for (id, value) in results.iter() {
            assert_eq!(*value, id * 10);
        }
        assert_eq!(started_rx.try_iter().count(), 3);
    }

    #[test]
    fn free_worker_takes_the_next_job_without_poll() {
        let mut pool = WorkerPool::new(1).expect("pool");
        let (gate_tx, gate_rx) = channel::bounded(1);
        let (started_tx, started_rx) = channel::unbounded();
        for (id, gate) in [(1u64, Some(gate_rx)), (2, None)] {
            pool.enqueue(
                Gated {
                    id,
                    gate,
                    started: started_tx.clone(),
                },
                |_| {},
            );
        }

        let wait = Duration::from_secs(5);
        assert_eq!(started_rx.recv_timeout(wait), Ok(1));
        assert_eq!(pool.queued(), 1);
        assert_eq!(pool.in_flight(), 1);

        // Nothing polls the pool here; the worker must move on by itself.
        gate_tx.send(()).expect("release gate");
        assert_eq!(started_rx.recv_timeout(wait), Ok(2));

        pool.wait_idle();
        assert!(pool.is_empty());
    }

    #[test]
    fn jobs_after_shutdown_report_stopped() {
        let mut pool: WorkerPool<Square> = WorkerPool::new(1).expect("pool");
        pool.jobs.take();
        let outcome = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&outcome);
        pool.enqueue(Square(3), move |result| *seen.borrow_mut() = Some(result));
        assert!(matches!(*outcome.borrow(), Some(Err(WorkerError::Stopped))));
        assert!(!pool.is_busy());
    }

    #[test]
    fn panicking_job_is_isolated() {
        let mut pool = WorkerPool::new(2).expect("pool");
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        for job in [Flaky::Fine(1), Flaky::Explode, Flaky::Fine(3), Flaky::Fine(4)] {
            let outcomes = Rc::clone(&outcomes);
            pool.enqueue(job, move |result| outcomes.borrow_mut().push(result));
        }
        pool.wait_idle();

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 4);
        let failures: Vec<&WorkerError> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            WorkerError::Panicked { job: 1, operation, message }
                if operation == "explode" && message == "mesh build blew up"
        ));
        let mut values: Vec<u64> = outcomes.iter().filter_map(|o| o.as_ref().ok().copied()).collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 3, 4]);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn poll_without_work_is_a_no_op() {
        let mut pool: WorkerPool<Square> = WorkerPool::new(2).expect("pool");
        assert_eq!(pool.poll(), 0);
        assert!(pool.is_empty());
        pool.wait_idle();
    }
}
