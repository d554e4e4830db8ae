use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError};

use super::method::MapperMethod;
use super::registry::MethodCache;
use super::value::MapperValue;
use super::{Arg, Mapper, MethodDecl};
use crate::error::SqlMapperError;
use crate::session::SqlSession;

/// A mapper bound to one session.
///
/// [`invoke`](Self::invoke) runs a declared method; equality, hashing and `Debug` are
/// about the proxy itself and never reach the session.
pub struct MapperProxy<'s, M> {
    session: &'s mut SqlSession,
    methods: Arc<Vec<MethodDecl>>,
    method_cache: MethodCache,
    _mapper: PhantomData<fn() -> M>,
}

impl<'s, M: Mapper> MapperProxy<'s, M> {
    pub(crate) fn new(
        session: &'s mut SqlSession,
        methods: Arc<Vec<MethodDecl>>,
        method_cache: MethodCache,
    ) -> Self {
        Self {
            session,
            methods,
            method_cache,
            _mapper: PhantomData,
        }
    }

    /// Call the declared method `method` with `args`.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if the mapper does not declare the method or
    /// it cannot be bound, and propagates execution errors.
    pub async fn invoke(
        &mut self,
        method: &str,
        args: Vec<Arg<'_>>,
    ) -> Result<MapperValue, SqlMapperError> {
        let mapper_method = self.cached_mapper_method(method)?;
        mapper_method.execute(self.session, args).await
    }

    /// The session the proxy runs on, e.g. to commit after a series of calls.
    pub fn session(&mut self) -> &mut SqlSession {
        self.session
    }

    fn cached_mapper_method(&self, method: &str) -> Result<Arc<MapperMethod>, SqlMapperError> {
        let mut cache = self
            .method_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = cache.get(method) {
            return Ok(Arc::clone(found));
        }
        let decl = self
            .methods
            .iter()
            .find(|decl| decl.name == method)
            .ok_or_else(|| {
                SqlMapperError::BindingError(format!(
                    "Method {method} is not declared by mapper {}",
                    M::NAME
                ))
            })?;
        let bound = Arc::new(MapperMethod::new(
            self.session.configuration(),
            M::NAME,
            decl,
        )?);
        cache.insert(method.to_owned(), Arc::clone(&bound));
        Ok(bound)
    }
}

impl<M: Mapper> fmt::Debug for MapperProxy<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapperProxy<{}>@{:p}", M::NAME, self)
    }
}

impl<M> PartialEq for MapperProxy<'_, M> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl<M> Eq for MapperProxy<'_, M> {}

impl<M> Hash for MapperProxy<'_, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}
