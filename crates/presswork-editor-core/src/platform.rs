//! Platform abstraction traits.
//!
//! These are the seams between the editor logic and its host: where nodes
//! are drawn on screen, how users are told about outcomes, and where the
//! natural size of a stored asset can be found.

use presswork_media::Dimensions;

use crate::decoration::Rect;
use crate::document::NodeRef;
use crate::node::AssetRef;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    Success,
    Info,
    Error,
}

/// Surfaces outcomes to the user (toasts, status lines).
pub trait Notifier {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Routes notifications to the log. Used when the host supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Error => tracing::warn!(%message, "notify"),
            NotifyKind::Success | NotifyKind::Info => tracing::info!(%message, "notify"),
        }
    }
}

/// Where nodes are rendered.
pub trait ViewGeometry {
    /// Bounding box of the rendered node, in editor-relative pixels.
    ///
    /// Returns None if the node is not currently rendered.
    fn node_rect(&self, node: &NodeRef) -> Option<Rect>;
}

/// No rendering information; callers fall back to stored sizes.
impl ViewGeometry for () {
    fn node_rect(&self, _node: &NodeRef) -> Option<Rect> {
        None
    }
}

/// Looks up the natural pixel size of an image asset.
pub trait NaturalSizeSource {
    fn natural_size(&self, asset: &AssetRef) -> Option<Dimensions>;
}

impl NaturalSizeSource for () {
    fn natural_size(&self, _asset: &AssetRef) -> Option<Dimensions> {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Keeps every notification for assertions.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingNotifier(Arc<Mutex<Vec<(NotifyKind, String)>>>);

    impl RecordingNotifier {
        pub(crate) fn messages(&self) -> Vec<(NotifyKind, String)> {
            self.0.lock().unwrap().clone()
        }

        pub(crate) fn kinds(&self) -> Vec<NotifyKind> {
            self.messages().into_iter().map(|(kind, _)| kind).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, kind: NotifyKind, message: &str) {
            self.0.lock().unwrap().push((kind, message.to_string()));
        }
    }
}
