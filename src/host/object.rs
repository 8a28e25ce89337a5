use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::HostError;
use crate::host::types::TypeHandle;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Implementation state behind a host object.
///
/// The backing is dropped exactly once, when the last strong
/// [`HostObject`] reference goes away.
pub trait ObjectBacking: Send + Sync {
    /// Invoke `method` with JSON arguments.
    fn invoke(&self, method: &str, args: &[serde_json::Value])
        -> Result<serde_json::Value, HostError>;

    fn as_any(&self) -> &dyn Any;
}

struct ObjectInner {
    id: u64,
    type_handle: TypeHandle,
    type_name: String,
    backing: Box<dyn ObjectBacking>,
}

/// Reference-counted host object. Cloning takes a new strong reference.
#[derive(Clone)]
pub struct HostObject {
    inner: Arc<ObjectInner>,
}

impl HostObject {
    pub(crate) fn new(type_handle: TypeHandle, type_name: String, backing: Box<dyn ObjectBacking>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
                type_handle,
                type_name,
                backing,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn type_handle(&self) -> TypeHandle {
        self.inner.type_handle
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    #[must_use]
    pub fn backing(&self) -> &dyn ObjectBacking {
        self.inner.backing.as_ref()
    }

    /// Number of strong host references to this object.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn invoke(
        &self,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, HostError> {
        self.inner.backing.invoke(method, args)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("id", &self.inner.id)
            .field("type", &self.inner.type_name)
            .field("refs", &self.strong_count())
            .finish()
    }
}

/// Non-owning reference to a [`HostObject`].
#[derive(Clone)]
pub struct WeakHostObject {
    inner: Weak<ObjectInner>,
}

impl WeakHostObject {
    #[must_use]
    pub fn upgrade(&self) -> Option<HostObject> {
        self.inner.upgrade().map(|inner| HostObject { inner })
    }
}
