//! Session event stream: facts about what a research session did.
//!
//! The orchestrator emits these over a broadcast channel; UI and
//! persistence collaborators subscribe without the core hard-wiring any
//! transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{NodeStatus, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StatusChanged {
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
        percentage: f32,
    },

    NodeStarted {
        session_id: Uuid,
        node_id: Uuid,
        topic: String,
        depth: usize,
    },

    IterationCompleted {
        session_id: Uuid,
        node_id: Uuid,
        iteration: u32,
        query: String,
        sources_found: u32,
    },

    SourceDiscovered {
        session_id: Uuid,
        node_id: Uuid,
        source_id: Uuid,
        title: String,
    },

    NodeCompleted {
        session_id: Uuid,
        node_id: Uuid,
        status: NodeStatus,
        sources_found: u32,
    },

    SynthesisRevised {
        session_id: Uuid,
        revision: u32,
        overall: f32,
    },

    Completed {
        session_id: Uuid,
        total_sources: u32,
        quality_score: f32,
    },

    Cancelled {
        session_id: Uuid,
    },

    Failed {
        session_id: Uuid,
        message: String,
    },
}
