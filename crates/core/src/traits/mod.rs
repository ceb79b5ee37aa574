pub mod collaborators;
pub mod repository;
pub mod task_queue;

pub use collaborators::*;
pub use repository::*;
pub use task_queue::*;
