//! Canonical protocol entities: `Item`, `Response`, `StreamEvent`, and the
//! ID schemes that identify them.

pub mod event;
pub mod ids;
pub mod item;
pub mod response;

pub use event::StreamEvent;
pub use item::{CodeInterpreterOutput, ContentPart, FileSearchResult, Item, ItemStatus, Role};
pub use response::{RequestControls, Response, ResponseStatus};
