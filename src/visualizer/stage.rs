use crate::kernels::{render_into, KernelDescriptor, UniformSet};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type ListenerId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    AlreadyDisposed,
    NoSurface(String),
    MissingContainer(String),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDisposed => write!(f, "surface already disposed"),
            Self::NoSurface(id) => write!(f, "container {id:?} has no surface"),
            Self::MissingContainer(id) => write!(f, "no container with id {id:?}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// RGBA8 render target inserted into a container.
#[derive(Debug, Clone)]
pub struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    disposed: bool,
}

impl Surface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width.saturating_mul(height).saturating_mul(4)],
            disposed: false,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        if self.disposed || (self.width == width && self.height == height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width.saturating_mul(height).saturating_mul(4)];
    }

    pub fn draw(&mut self, kernel: Option<&KernelDescriptor>, uniforms: &UniformSet) {
        if self.disposed {
            return;
        }
        render_into(kernel, uniforms, self.width, self.height, &mut self.pixels);
    }

    /// Frees the pixel storage. A second call reports `AlreadyDisposed`.
    pub fn dispose(&mut self) -> Result<(), SurfaceError> {
        if self.disposed {
            return Err(SurfaceError::AlreadyDisposed);
        }
        self.disposed = true;
        self.pixels = Vec::new();
        Ok(())
    }
}

#[derive(Debug)]
struct Container {
    width: usize,
    height: usize,
    surface: Option<Surface>,
}

/// The host page: named containers and the window's resize listeners.
#[derive(Default)]
pub struct Stage {
    containers: RefCell<BTreeMap<String, Container>>,
    resize_listeners: RefCell<Vec<(ListenerId, Rc<dyn Fn()>)>>,
    next_listener: Cell<ListenerId>,
}

impl Stage {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn add_container(&self, id: &str, width: usize, height: usize) {
        self.containers.borrow_mut().insert(
            id.to_string(),
            Container {
                width,
                height,
                surface: None,
            },
        );
    }

    pub fn remove_container(&self, id: &str) -> bool {
        self.containers.borrow_mut().remove(id).is_some()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.containers.borrow().contains_key(id)
    }

    pub fn container_size(&self, id: &str) -> Option<(usize, usize)> {
        self.containers.borrow().get(id).map(|c| (c.width, c.height))
    }

    /// Changes the container's layout size. Surfaces follow on the next
    /// resize dispatch.
    pub fn set_container_size(&self, id: &str, width: usize, height: usize) -> bool {
        match self.containers.borrow_mut().get_mut(id) {
            Some(c) => {
                c.width = width;
                c.height = height;
                true
            }
            None => false,
        }
    }

    pub fn attach_surface(&self, id: &str, surface: Surface) -> bool {
        match self.containers.borrow_mut().get_mut(id) {
            Some(c) => {
                c.surface = Some(surface);
                true
            }
            None => false,
        }
    }

    pub fn with_surface<R>(&self, id: &str, f: impl FnOnce(&Surface) -> R) -> Option<R> {
        let containers = self.containers.borrow();
        containers.get(id)?.surface.as_ref().map(f)
    }

    pub fn with_surface_mut<R>(&self, id: &str, f: impl FnOnce(&mut Surface) -> R) -> Option<R> {
        let mut containers = self.containers.borrow_mut();
        containers.get_mut(id)?.surface.as_mut().map(f)
    }

    pub fn dispose_surface(&self, id: &str) -> Result<(), SurfaceError> {
        let mut containers = self.containers.borrow_mut();
        let container = containers
            .get_mut(id)
            .ok_or_else(|| SurfaceError::MissingContainer(id.to_string()))?;
        container
            .surface
            .as_mut()
            .ok_or_else(|| SurfaceError::NoSurface(id.to_string()))?
            .dispose()
    }

    /// Removes whatever is rendered inside the container.
    pub fn clear_container(&self, id: &str) {
        if let Some(c) = self.containers.borrow_mut().get_mut(id) {
            c.surface = None;
        }
    }

    pub fn is_container_empty(&self, id: &str) -> bool {
        self.containers
            .borrow()
            .get(id)
            .map(|c| c.surface.is_none())
            .unwrap_or(true)
    }

    pub fn add_resize_listener(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        let id = self.next_listener.get() + 1;
        self.next_listener.set(id);
        self.resize_listeners.borrow_mut().push((id, listener));
        id
    }

    pub fn remove_resize_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.resize_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn resize_listener_count(&self) -> usize {
        self.resize_listeners.borrow().len()
    }

    /// Fires the window resize event.
    pub fn dispatch_resize(&self) {
        let listeners = self
            .resize_listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener();
        }
    }
}
