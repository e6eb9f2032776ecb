//! Clock plumbing shared by every simulated component: strongly-typed cycle
//! counts, exact rational time, sub-cycle event scheduling and the
//! sleep/wake protocol by which idle components request coarser clocking.

pub mod cycles;
pub mod event_loop;
pub mod hint;
pub mod task_queue;
pub mod time;

pub use cycles::{Cycles, HalfCycles};
pub use event_loop::TimedEventLoop;
pub use hint::{ClockingObserver, ClockingPreference, ClockingSource};
pub use task_queue::{AsyncTaskQueue, DeferringAsyncTaskQueue};
pub use time::Time;
