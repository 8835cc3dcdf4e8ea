pub mod error;
pub mod path;
pub mod transport;
pub mod trie;
pub mod upload;

pub use error::{Result, UploadError};

pub use path::RemotePath;

pub use transport::{http::put_file, ProgressSink, Transport, Url};

pub use trie::PathTrie;

pub use upload::{
    FileInfo, SchedulerStats, SessionId, TaskId, TaskState, UploadConfig, UploadManager,
    UploadProgress, UploadSession, UploadingFile,
};
