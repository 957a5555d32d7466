//! viewsync - two-way synchronization between local entity state and its
//! remotely rendered views
//!
//! An entity ([`Reactive`]) declares typed attributes. Rendering it into a
//! [`Document`] creates a [`View`] bound to one [`Channel`]; local writes are
//! pushed to every view, client-side changes are debounced and applied back,
//! and echoes of values the server just pushed are discarded.

pub mod channel;
pub mod config;
pub mod document;
pub mod error;
pub mod rename;
pub mod state;
pub mod sync;
pub mod view;

pub use channel::{Channel, ChannelKind, CommChannel, CommManager, SessionChannel};
pub use config::SyncConfig;
pub use document::{Document, DocumentKind, TimeoutHandle};
pub use error::{Result, SyncError};
pub use rename::{Codec, RenameTable, Transform};
pub use state::{AttributeChanged, LocalState, ParamKind, ParamSpec, PropertyMap, WatcherId};
pub use sync::{Reactive, ReactiveBuilder, ReactiveOptions, WatcherScope};
pub use view::{NotebookBundle, SessionBinding, View, ViewManager, ViewRef, ViewRegistry};
