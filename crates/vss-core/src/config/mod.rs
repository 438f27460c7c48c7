pub mod engine;
pub mod store;

pub use engine::VssConfig;
pub use store::{StoreConfig, SynchronousMode};
