//! One step per node of the assistant graph.

mod calendar;
mod fitness;
mod format;
mod general;
mod memory;
mod recovery;
mod route;
mod weather;

pub use calendar::CalendarStep;
pub use fitness::FitnessStep;
pub use format::FormatStep;
pub use general::GeneralStep;
pub use memory::MemoryStep;
pub use recovery::RecoveryStep;
pub use route::RouteStep;
pub use weather::WeatherStep;

#[cfg(test)]
pub(crate) use format::compose;
