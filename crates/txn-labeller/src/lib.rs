//! Transaction labeller.
//!
//! Collapses concrete request paths into a small, stable set of transaction
//! labels so that `/values/get/1` and `/values/get/2` are reported under one
//! name such as `values/get/:id`.
//!
//! A controller/action pair alone is not enough to build the label: an action
//! may be overloaded (`get()` and `get(id)`), so each action route carries an
//! ordered list of regex patterns tested against the literal request path.
//!
//! # Components
//!
//! - `models` - `ActionMapping`, `PathMapping` and the immutable `RuleSnapshot`
//! - `store` - `MappingStore` contract plus JSON-file and in-memory stores
//! - `watcher` - polling change detection for the JSON mapping file
//! - `resolver` - `LabelResolver`, the hot-swappable lookup used per request
//!
//! # Mapping document
//!
//! ```json
//! [
//!   { "actionRoute": "valuescontroller/get",
//!     "pathMappings": [
//!       { "pattern": "valuescontroller/get/[0-9]+$", "label": "valuescontroller/get/:id" },
//!       { "pattern": "valuescontroller/get$",         "label": "valuescontroller/get" }
//!     ]
//!   }
//! ]
//! ```

pub mod errors;
pub mod models;
pub mod resolver;
pub mod store;
pub mod watcher;

pub use errors::MappingError;
pub use models::{ActionMapping, PathMapping, RuleSnapshot};
pub use resolver::LabelResolver;
pub use store::{ChangeHandler, InMemoryMappingStore, JsonFileMappingStore, MappingStore};
pub use watcher::{spawn_mapping_watcher, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
