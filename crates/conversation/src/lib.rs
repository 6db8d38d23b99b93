//! Conversation core: transcript store, loading sequencer and the controller
//! that runs one query at a time against the backend.

pub mod controller;
pub mod sequencer;
pub mod status_lines;
pub mod store;
pub mod view;

pub use controller::{ControllerEvent, ControllerOptions, ConversationController, PendingRequest};
pub use sequencer::{LoadingCue, LoadingSequencer, SequencerState, TimerKind, TimerTick};
pub use status_lines::StatusPool;
pub use store::MessageStore;
pub use view::ChatView;
