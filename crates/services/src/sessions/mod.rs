mod events;
mod machine;
mod store;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use events::SessionEvent;
pub use machine::{Collaborators, ExamOutcome, SessionMachine, SessionSnapshot};
pub use store::SessionStore;
