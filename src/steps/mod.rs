pub mod collect;
pub mod compose;
pub mod write;
