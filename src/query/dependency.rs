use {
    crate::component::ComponentId,
    hashbrown::HashMap,
    parking_lot::{Condvar, Mutex},
};

/// Scheduler contract for completing jobs before a query touches components.
pub trait JobDependencies {
    /// Blocks until no job writing `component` is running.
    fn complete_read(&self, component: ComponentId);

    /// Blocks until no job reading or writing `component` is running.
    fn complete_write(&self, component: ComponentId);
}

/// Dependencies of single threaded code.
/// Nothing is ever running concurrently.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDependencies;

impl JobDependencies for NoDependencies {
    fn complete_read(&self, _: ComponentId) {}
    fn complete_write(&self, _: ComponentId) {}
}

impl<D: JobDependencies + ?Sized> JobDependencies for &D {
    fn complete_read(&self, component: ComponentId) {
        (**self).complete_read(component)
    }

    fn complete_write(&self, component: ComponentId) {
        (**self).complete_write(component)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Fences {
    readers: usize,
    writers: usize,
}

/// Tracks components accessed by running jobs.
///
/// Jobs take a fence for each component they access and release it when dropped.
#[derive(Debug, Default)]
pub struct FenceTracker {
    fences: Mutex<HashMap<ComponentId, Fences>>,
    released: Condvar,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `component` as being read until returned fence is dropped.
    pub fn begin_read(&self, component: ComponentId) -> ReadFence<'_> {
        self.fences.lock().entry(component).or_default().readers += 1;
        ReadFence {
            tracker: self,
            component,
        }
    }

    /// Marks `component` as being written until returned fence is dropped.
    pub fn begin_write(&self, component: ComponentId) -> WriteFence<'_> {
        self.fences.lock().entry(component).or_default().writers += 1;
        WriteFence {
            tracker: self,
            component,
        }
    }

    /// Number of live read fences on `component`.
    pub fn readers(&self, component: ComponentId) -> usize {
        self.fences.lock().get(&component).map_or(0, |f| f.readers)
    }

    /// Number of live write fences on `component`.
    pub fn writers(&self, component: ComponentId) -> usize {
        self.fences.lock().get(&component).map_or(0, |f| f.writers)
    }

    fn release(&self, component: ComponentId, write: bool) {
        let mut fences = self.fences.lock();
        if let Some(f) = fences.get_mut(&component) {
            if write {
                f.writers -= 1;
            } else {
                f.readers -= 1;
            }
            if f.readers == 0 && f.writers == 0 {
                fences.remove(&component);
            }
        }
        self.released.notify_all();
    }

    fn wait_while(&self, component: ComponentId, busy: impl Fn(&Fences) -> bool) {
        let mut fences = self.fences.lock();
        while fences.get(&component).map_or(false, &busy) {
            log::trace!("Waiting for jobs accessing {}", component);
            self.released.wait(&mut fences);
        }
    }
}

impl JobDependencies for FenceTracker {
    fn complete_read(&self, component: ComponentId) {
        self.wait_while(component, |f| f.writers > 0)
    }

    fn complete_write(&self, component: ComponentId) {
        self.wait_while(component, |f| f.writers > 0 || f.readers > 0)
    }
}

/// Live read access of a job.
#[derive(Debug)]
pub struct ReadFence<'a> {
    tracker: &'a FenceTracker,
    component: ComponentId,
}

impl Drop for ReadFence<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.component, false)
    }
}

/// Live write access of a job.
#[derive(Debug)]
pub struct WriteFence<'a> {
    tracker: &'a FenceTracker,
    component: ComponentId,
}

impl Drop for WriteFence<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.component, true)
    }
}
