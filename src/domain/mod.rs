pub mod entities;
pub mod repositories;
pub mod value_objects;
pub mod workflow_state;
