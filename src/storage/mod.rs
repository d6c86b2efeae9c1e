pub mod chroma_client;
pub mod entry_store;
pub mod local_index;
pub mod row_store;
pub mod vector_index;

pub use chroma_client::{ChromaClient, ChromaError};
pub use entry_store::{EntryStore, ReconciliationReport, StoreError};
pub use local_index::LocalIndex;
pub use row_store::{RowStore, RowStoreError};
pub use vector_index::{IndexError, IndexHit, IndexRecord, VectorIndex};
