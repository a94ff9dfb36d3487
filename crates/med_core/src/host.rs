use std::sync::Arc;

use crate::clock::Clock;
use crate::notifications::{NotificationSink, PermissionHandle};
use crate::store::LocalStore;

/// Services one device provides to both execution contexts.
#[derive(Clone)]
pub struct HostEnv {
    pub store: Arc<dyn LocalStore>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn NotificationSink>,
    pub permission: PermissionHandle,
}
