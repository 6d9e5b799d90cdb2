/// Utility containers shared by the backend

pub mod freelist;

pub use freelist::FreeList;
