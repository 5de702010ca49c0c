//! Chat loop: per-session state and the transcript it keeps.

mod session;
mod transcript;

pub use session::{ChatSession, CredentialStatus, TurnState};
pub use transcript::{Transcript, Turn, TurnRole};
