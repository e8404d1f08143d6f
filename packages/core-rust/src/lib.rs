//! `SheetSync` Core: table model, sheet grid normalization, column mapping,
//! polling backoff policy, and HTTP wire types.

pub mod backoff;
pub mod clock;
pub mod error;
pub mod grid;
pub mod mapper;
pub mod messages;
pub mod types;

pub use backoff::{BackoffPolicy, PollInterval};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{SyncError, SyncResult};
pub use grid::FetchedSheet;
pub use mapper::project;
pub use types::{Column, ColumnType, NewColumn, Row, SyncUpdate, Table, TableId};
