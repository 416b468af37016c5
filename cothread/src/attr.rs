//!
//! Thread Attributes
//!
//! A `ThreadAttr` is read once when a thread is created; changing it later
//! has no effect on threads already running, and one value can be reused
//! for any number of creations.
//!

use crate::config::MIN_STACK_SIZE;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetachState {
    #[default]
    Joinable,
    Detached,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadAttr {
    detach_state: DetachState,
    stack_size: Option<usize>,
    name: Option<String>,
}

impl ThreadAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detach_state(&mut self, state: DetachState) -> Result<()> {
        self.detach_state = state;
        Ok(())
    }

    pub fn detach_state(&self) -> DetachState {
        self.detach_state
    }

    /// Stack size hint passed to the native thread builder. `None` falls back
    /// to the runtime configuration, then to the platform default.
    pub fn set_stack_size(&mut self, bytes: usize) -> Result<()> {
        if bytes < MIN_STACK_SIZE {
            return Err(Error::InvalidArgument(format!(
                "stack size {} is below the minimum of {}",
                bytes, MIN_STACK_SIZE
            )));
        }
        self.stack_size = Some(bytes);
        Ok(())
    }

    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.contains('\0') {
            return Err(Error::InvalidArgument("thread name contains a NUL byte".to_string()));
        }
        self.name = Some(name);
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
