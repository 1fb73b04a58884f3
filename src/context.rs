/*! Process context.

Settings that are global to the process, like the log level mask, live in
one explicitly constructed [`Context`]. Applying it is a one-time
operation: the first [`Context::init`] in the process wins, and later calls
do nothing.

```
use sigutils::context::Context;
let ctx = Context::from_json(r#"{"log_level": "debug"}"#)?;
ctx.init();
assert!(Context::active().is_some());
# Ok::<(), sigutils::Error>(())
```
*/
use std::sync::OnceLock;

use log::{LevelFilter, debug, warn};
use serde::{Deserialize, Serialize};

use crate::Result;

static ACTIVE: OnceLock<Context> = OnceLock::new();

/// Process wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Context {
    /// Maximum log level let through to the installed logger.
    pub log_level: LevelFilter,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
        }
    }
}

impl Context {
    /// Create new context with the given log level mask.
    #[must_use]
    pub fn new(log_level: LevelFilter) -> Self {
        Self { log_level }
    }

    /// Parse context from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Apply the context to the process.
    ///
    /// Only the first call has an effect. Returns true if this call was the
    /// one that applied it.
    pub fn init(&self) -> bool {
        let mut applied = false;
        let active = ACTIVE.get_or_init(|| {
            log::set_max_level(self.log_level);
            applied = true;
            self.clone()
        });
        if applied {
            debug!("Context initialized: {active:?}");
        } else if active != self {
            warn!("Context already initialized as {active:?}, ignoring {self:?}");
        }
        applied
    }

    /// The context applied to the process, if any.
    #[must_use]
    pub fn active() -> Option<&'static Context> {
        ACTIVE.get()
    }
}
