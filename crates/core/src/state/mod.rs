pub mod checkpoint;
pub mod io;
pub mod model;
pub mod run;
pub mod schema;

pub use checkpoint::{Checkpoint, Checkpointer, InMemoryCheckpointer, SqliteCheckpointer};
pub use model::{C4Model, Field, Level, LevelOutput, ModelUpdate, Slot};
pub use run::RunState;
pub use schema::{Element, ElementKind, Relationship, StructuredDefinition};
