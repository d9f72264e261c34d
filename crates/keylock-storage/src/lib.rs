//! On-disk implementations for keylock: the key store, the AES-GCM envelope,
//! the binding metadata file, and the orchestrator that ties them to one
//! protected file.

mod atomic;
pub mod binding_file;
pub mod envelope;
pub mod key_store;
pub mod protected_file;
