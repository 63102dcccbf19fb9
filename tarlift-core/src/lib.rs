pub mod archive;
pub mod cancel;
pub mod checksum;
pub mod error;
pub mod exec;
pub mod inventory;
pub mod master_manifest;
pub mod part_manifest;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod transfer;

pub use error::{Error, Result, Stage};
