//! Bridge configuration.

use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::BridgeError;

/// Receives every error the bridge does not return directly.
pub type ErrorHandler = Rc<dyn Fn(&BridgeError)>;

/// Field synced when none is configured.
pub const DEFAULT_TRACKED_FIELD: &str = "content";

/// Options for [`OtBridge`](crate::OtBridge).
///
/// Deserializable so hosts can embed it in their own config files; the error
/// handler is runtime-only.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Top-level document field mirrored into the editor.
    pub tracked_field: SmolStr,
    /// Log every translated operation at info level instead of debug.
    pub verbose: bool,
    #[serde(skip)]
    pub error_handler: Option<ErrorHandler>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            tracked_field: SmolStr::new_static(DEFAULT_TRACKED_FIELD),
            verbose: false,
            error_handler: None,
        }
    }
}

impl BridgeOptions {
    pub fn new(tracked_field: impl Into<SmolStr>) -> Self {
        Self {
            tracked_field: tracked_field.into(),
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_error_handler(mut self, handler: impl Fn(&BridgeError) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// The configured handler, or one that logs.
    pub(crate) fn resolved_error_handler(&self) -> ErrorHandler {
        self.error_handler.clone().unwrap_or_else(|| {
            Rc::new(|err: &BridgeError| tracing::error!(error = %err, "ot bridge error"))
        })
    }
}

impl fmt::Debug for BridgeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeOptions")
            .field("tracked_field", &self.tracked_field)
            .field("verbose", &self.verbose)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}
