pub mod scripted;
pub mod synthetic;

pub use scripted::ScriptedBackend;
pub use synthetic::SyntheticBackend;
