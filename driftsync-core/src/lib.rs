mod backend;
mod error;
mod http_store;

pub use backend::{
    ObjectMeta, PartSink, ProgressFn, RemoteObject, ResumeState, StorageBackend, TransferContext,
};
pub use error::{ErrorClass, StorageError};
pub use http_store::HttpObjectStore;
