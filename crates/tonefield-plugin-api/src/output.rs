use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::geometry::Size;

/// Name of the surface whose pixel size bounds the mapped points.
pub const MAIN_SURFACE: &str = "main";

/// Opaque reference to a rendering surface owned outside the engine.
#[derive(Clone)]
pub struct OutputSurface {
    pub size: Size,
    target: Arc<dyn Any + Send + Sync>,
}

impl OutputSurface {
    pub fn new<T: Any + Send + Sync>(size: Size, target: Arc<T>) -> Self {
        Self { size, target }
    }

    pub fn target<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.target).downcast::<T>().ok()
    }
}

impl fmt::Debug for OutputSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSurface")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputTargets {
    surfaces: BTreeMap<String, OutputSurface>,
}

impl OutputTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(mut self, name: impl Into<String>, surface: OutputSurface) -> Self {
        self.insert(name, surface);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, surface: OutputSurface) {
        self.surfaces.insert(name.into(), surface);
    }

    pub fn surface(&self, name: &str) -> Option<&OutputSurface> {
        self.surfaces.get(name)
    }

    pub fn main_size(&self) -> Option<Size> {
        self.surface(MAIN_SURFACE).map(|surface| surface.size)
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
