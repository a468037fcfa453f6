mod controller;
mod state;

pub use controller::{SessionController, SessionError};
pub use state::SessionPhase;
