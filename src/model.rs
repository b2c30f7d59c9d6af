//! Type descriptor registry: one-time reflection from a host
//! record type into a [`TableDescriptor`], cached behind a read-mostly lock.
//!
//! This crate asks the host type to implement [`Model`] by hand, building
//! its descriptor with [`crate::table::TableDescriptorBuilder`] rather than
//! via a derive macro — see DESIGN.md for the rationale.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::config::ConnectionOptions;
use crate::error::Result;
use crate::table::TableDescriptor;
use crate::value::{BoundValue, SqlValue};

pub use crate::table::HasAffinity;

/// A host record type that can be reflected into a [`TableDescriptor`] and
/// whose fields can be bound to / materialized from [`SqlValue`]s.
pub trait Model: Sized + 'static {
    /// Builds this type's descriptor. Called exactly once per process per
    /// type by [`TypeRegistry::describe`].
    fn build_descriptor() -> TableDescriptor;

    /// Binds field `field_index` for writing.
    fn bind_field(&self, field_index: usize, options: &ConnectionOptions) -> Result<BoundValue>;

    /// Writes an extracted column value back into field `field_index`.
    fn set_field(&mut self, field_index: usize, value: SqlValue, options: &ConnectionOptions) -> Result<()>;

    /// A zero/default instance used as the materialization target before
    /// columns are written into it row by row.
    fn default_instance() -> Self;

    /// Writes `rowid` back into the auto-increment primary-key field after
    /// an insert.
    fn set_auto_increment_pk(&mut self, rowid: i64);
}

/// Process-wide cache of one [`TableDescriptor`] per [`Model`] type,
/// guarded by a read-mostly lock.
pub struct TypeRegistry {
    inner: RwLock<HashMap<TypeId, Arc<TableDescriptor>>>,
}

impl TypeRegistry {
    pub fn global() -> &'static TypeRegistry {
        static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| TypeRegistry {
            inner: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the cached descriptor for `T`, building and caching it on
    /// first use.
    pub fn describe<T: Model>(&self) -> Arc<TableDescriptor> {
        let id = TypeId::of::<T>();
        {
            let read = self.inner.read().expect("type registry lock poisoned");
            if let Some(descriptor) = read.get(&id) {
                return descriptor.clone();
            }
        }
        let built = Arc::new(T::build_descriptor());
        let mut write = self.inner.write().expect("type registry lock poisoned");
        // Another thread may have raced us; keep whichever was inserted first
        // so every caller observes a single, stable descriptor instance.
        write.entry(id).or_insert(built).clone()
    }
}
