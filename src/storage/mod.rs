mod archive_writer;
pub mod naming;

pub use archive_writer::{ArchiveWriter, OpenArchives};
