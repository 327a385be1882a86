mod base;
mod memory;
mod sqlite;

pub use base::{Checkpoint, Checkpointer};
pub use memory::InMemorySaver;
pub use sqlite::SqliteSaver;
