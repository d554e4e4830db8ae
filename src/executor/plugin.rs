use std::sync::Arc;

use super::Executor;

/// Wraps newly created executors, e.g. to log or time every call.
pub trait Interceptor: Send + Sync {
    fn plugin(&self, executor: Box<dyn Executor>) -> Box<dyn Executor>;
}

/// Interceptors applied to each new executor in registration order, so the last one
/// registered ends up outermost.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn plugin_all(&self, executor: Box<dyn Executor>) -> Box<dyn Executor> {
        self.interceptors
            .iter()
            .fold(executor, |target, interceptor| interceptor.plugin(target))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
