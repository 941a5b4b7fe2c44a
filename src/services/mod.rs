//! 服务模块

pub mod orchestrator;
pub mod selector;
pub mod training;

pub use orchestrator::{SessionOrchestrator, TurnReply};
pub use selector::{create_therapist_selector, SelectionOutcome, TherapistSelector, TypeScore};
pub use training::{
    create_training_runner, SimulatedSubject, TrainingOutcome, TrainingReport, TrainingRunner,
};
