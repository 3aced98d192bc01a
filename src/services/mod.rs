pub mod ai_service;
pub mod analyzer_service;
pub mod coordinator_service;
pub mod dedup_service;
pub mod embed_service;
pub mod planner_service;
pub mod progress_service;
pub mod session_service;
pub mod similarity;
pub mod store_service;
