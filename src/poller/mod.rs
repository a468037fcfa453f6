mod controller;
mod loop_worker;

pub use controller::PollerController;
pub use loop_worker::PollerPhase;
pub(crate) use loop_worker::PollerShared;
