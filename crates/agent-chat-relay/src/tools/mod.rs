//! Tool provider seam: discoverable capabilities handed to the agent per call.

mod stdio;

use std::sync::{Arc, Mutex};

use tracing::debug;

pub use stdio::StdioToolProvider;

use crate::errors::ToolProviderError;

/// A tool exposed by a provider.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// External process or service exposing callable tools.
///
/// A provider is a scoped resource: it is entered before a call, queried,
/// and exited when the call ends. One instance serves one call at a time.
pub trait ToolProvider: Send {
    fn name(&self) -> &str;

    fn enter(&mut self) -> Result<(), ToolProviderError>;

    fn list_tools(&mut self) -> Result<Vec<ToolSpec>, ToolProviderError>;

    /// Releases whatever `enter` acquired. Must be safe to call twice.
    fn exit(&mut self);
}

/// Tool provider shared by a session; the mutex serializes calls.
pub type SharedToolProvider = Arc<Mutex<Box<dyn ToolProvider>>>;

/// Wraps a provider so it can be handed to a session.
pub fn shared(provider: impl ToolProvider + 'static) -> SharedToolProvider {
    Arc::new(Mutex::new(Box::new(provider)))
}

/// Entered provider; exits it when dropped.
pub struct ToolScope<'a> {
    provider: &'a mut dyn ToolProvider,
}

impl<'a> ToolScope<'a> {
    pub fn enter(provider: &'a mut dyn ToolProvider) -> Result<Self, ToolProviderError> {
        if let Err(err) = provider.enter() {
            provider.exit();
            return Err(err);
        }
        debug!(provider = %provider.name(), "tool provider entered");
        Ok(Self { provider })
    }

    pub fn list_tools(&mut self) -> Result<Vec<ToolSpec>, ToolProviderError> {
        self.provider.list_tools()
    }
}

impl Drop for ToolScope<'_> {
    fn drop(&mut self) {
        self.provider.exit();
        debug!(provider = %self.provider.name(), "tool provider exited");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory provider that counts enter/exit pairs.
    pub(crate) struct StaticToolProvider {
        pub(crate) tools: Vec<ToolSpec>,
        pub(crate) fail_enter: bool,
        pub(crate) entered: Arc<AtomicUsize>,
        pub(crate) exited: Arc<AtomicUsize>,
        pub(crate) active: bool,
    }

    impl StaticToolProvider {
        pub(crate) fn new(tools: Vec<ToolSpec>) -> Self {
            Self {
                tools,
                fail_enter: false,
                entered: Arc::new(AtomicUsize::new(0)),
                exited: Arc::new(AtomicUsize::new(0)),
                active: false,
            }
        }
    }

    impl ToolProvider for StaticToolProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn enter(&mut self) -> Result<(), ToolProviderError> {
            if self.fail_enter {
                return Err(ToolProviderError::Spawn {
                    server: "static".into(),
                    message: "unreachable".into(),
                });
            }
            assert!(!self.active, "provider entered twice");
            self.active = true;
            self.entered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn list_tools(&mut self) -> Result<Vec<ToolSpec>, ToolProviderError> {
            if !self.active {
                return Err(ToolProviderError::NotEntered {
                    server: "static".into(),
                });
            }
            Ok(self.tools.clone())
        }

        fn exit(&mut self) {
            if self.active {
                self.active = false;
                self.exited.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
