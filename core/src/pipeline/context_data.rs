// core/src/pipeline/context_data.rs
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared, interiorly mutable context passed to every step handler.
///
/// IMPORTANT: lock guards are blocking and MUST be dropped before any
/// `.await` point. Copy what you need out of the guard, then await.
#[derive(Debug)]
pub struct ContextData<T: Send + Sync + 'static>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> ContextData<T> {
  pub fn new(data: T) -> Self {
    ContextData(Arc::new(RwLock::new(data)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.0.write()
  }

  /// Takes the data back out once the run is over. Fails (returning `self`)
  /// while a handler still holds a clone.
  pub fn into_inner(self) -> Result<T, Self> {
    Arc::try_unwrap(self.0)
      .map(RwLock::into_inner)
      .map_err(ContextData)
  }
}

impl<T: Send + Sync + 'static> Clone for ContextData<T> {
  fn clone(&self) -> Self {
    ContextData(Arc::clone(&self.0))
  }
}

impl<T: Send + Sync + 'static + Default> Default for ContextData<T> {
  fn default() -> Self {
    Self::new(Default::default())
  }
}
