//! Script composition: line builders, slot templates, and the two composers.

pub mod edits;
pub mod host;
pub mod repair;
pub mod shell;
pub mod template;
