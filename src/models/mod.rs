pub mod batch;
pub mod category;
pub mod item;
pub mod plan;
pub mod subtopic;
