//! Generates a matched pair of GRUB rescue scripts: a macOS command file that
//! prepares a FAT32 USB stick, and the Linux repair script it carries.

pub mod bundle;
pub mod compose;
pub mod config;
pub mod error;
pub mod output;
pub mod safety;
pub mod validate;

pub use bundle::{generate, RescueBundle};
pub use config::{Architecture, Configuration, Distro, RawConfig, Warning};
pub use error::RescueError;
