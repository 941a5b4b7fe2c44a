//! 领域模型

pub mod portrait;
pub mod record;
pub mod session;
pub mod skill;
pub mod stage;
pub mod therapist;
pub mod topic;

pub use portrait::{Portrait, PortraitCategory, PortraitDelta, PortraitFact};
pub use record::{improvement_score, MedicalRecord, ScaleBattery, ScaleKind, ScaleResult};
pub use session::{DialogueEntry, Session, SessionMode, SessionPhase, Speaker};
pub use skill::{SkillEntry, SkillRole};
pub use stage::{CbtStage, StageCatalog, StageProgress, StageSpec, StageTracker};
pub use therapist::{TherapistCatalog, TherapistDescriptor};
pub use topic::{Relevance, TopicEntry, TopicId, TopicScoreTable};
