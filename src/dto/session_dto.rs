use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::session_service::GenerationSession;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub position: u64,
}

impl From<&GenerationSession> for SessionResponse {
    fn from(session: &GenerationSession) -> Self {
        Self {
            session_id: session.id(),
            position: session.position(),
        }
    }
}
