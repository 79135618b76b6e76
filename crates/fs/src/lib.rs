//! Local file-system implementation of the session gateway.
//!
//! [`LocalGateway`] lists, reads, searches and creates entries on disk, follows
//! the open folder with a `notify` watcher and delegates folder picking to a
//! [`FolderPicker`].

pub mod decode;
mod gateway;
mod monitor;
mod picker;

pub use decode::decode_text;
pub use gateway::LocalGateway;
pub use picker::{FolderPicker, StaticPicker};
