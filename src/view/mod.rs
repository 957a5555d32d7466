//! Remote views - rendered instances of entities and their lifecycle

mod lifecycle;
mod model;
mod registry;

pub use lifecycle::{NotebookBundle, SessionBinding, ViewManager};
pub use model::{View, ViewRef, WeakView};
pub use registry::ViewRegistry;
