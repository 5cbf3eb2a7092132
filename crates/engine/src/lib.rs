pub mod clock;
pub mod dates;
pub mod error;
pub mod events;
pub mod grid;
pub mod harness;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod supply;
pub mod txlog;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GridError, NormalizeError, StoreError, StoreErrorKind};
pub use events::GridEvent;
pub use grid::{GridController, GridSnapshot, KeyCommand, Outcome, StoreOp, StoreRequest};
pub use harness::GridHarness;
pub use record::{FieldMap, FieldValue, Record, RecordId};
pub use schema::{RecordKind, Schema};
pub use store::{MemoryStore, RecordStore};
