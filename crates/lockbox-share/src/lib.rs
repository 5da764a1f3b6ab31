//! lockbox-share: who may attempt to decrypt a file, and the entry points
//! that tie the gate to storage.
//!
//! Access flow:
//! ```text
//! target (file id | link token) + actor + optional password
//!   → identify   (NotFound)
//!   → authorize  (Forbidden | Expired)
//!   → no password: metadata only
//!   → password:    unwrap key → decrypt payload (any failure: AccessDenied)
//! ```

pub mod catalog;
pub mod clock;
pub mod error;
pub mod gate;
pub mod record;
pub mod service;

pub use catalog::{Catalog, Checkpoint, PendingFlush, RecordSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AccessError, AccessResult};
pub use gate::{
    authorize, evaluate, open_content, refuse, Actor, Authorization, Role, StoredBlobs, Target,
};
pub use record::{AccessOutcome, FileMetadata, FileRecord, NewFile, ShareGrant, ShareLink};
pub use service::{FileService, ServiceSettings};
