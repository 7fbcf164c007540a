//! Task specifications and the task repository.
//!
//! A task is a directory under the tasks root containing a `task.yaml`
//! file plus any scripts and prompt files it references:
//!
//! ```text
//! tasks/
//! └── scale-deployment/
//!     ├── task.yaml
//!     ├── setup.sh
//!     ├── verify.sh
//!     └── cleanup.sh
//! ```
//!
//! The task identifier is the directory name.

pub mod loader;
pub mod spec;

pub use loader::{load_tasks, TASK_FILE_NAME};
pub use spec::{Expectation, IsolationMode, ScriptStep, Task, DEFAULT_TASK_TIMEOUT};
