pub mod event;

pub use event::{EventDocument, EventMeta, RawViewer, StoredEvent, VendorEvent};
