pub mod appraise;
pub mod citations;
pub mod consensus;
pub mod events;
pub mod explorer;
pub mod perspectives;
pub mod pool;
pub mod review;
pub mod session;
pub mod synthesis;

pub use events::EventBus;
pub use explorer::Explorer;
pub use pool::{PoolOutcome, SourcePool};
pub use review::{HeuristicScorer, QualityReport, ReviewContext, ReviewLoop, SynthesisScorer};
pub use session::{Orchestrator, ResearchService, RunSummary};
