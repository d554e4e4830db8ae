use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use super::method::MapperMethod;
use super::proxy::MapperProxy;
use super::{Mapper, MethodDecl};
use crate::error::SqlMapperError;
use crate::session::SqlSession;

pub(crate) type MethodCache = Arc<Mutex<HashMap<String, Arc<MapperMethod>>>>;

/// Produces session-bound proxies for one mapper type.
///
/// Every proxy shares the factory's method cache, so a method is bound at most once no
/// matter how many sessions use the mapper.
pub struct MapperProxyFactory<M> {
    methods: Arc<Vec<MethodDecl>>,
    method_cache: MethodCache,
    _mapper: PhantomData<fn() -> M>,
}

impl<M: Mapper> MapperProxyFactory<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: Arc::new(M::methods()),
            method_cache: Arc::new(Mutex::new(HashMap::new())),
            _mapper: PhantomData,
        }
    }

    #[must_use]
    pub fn new_instance<'s>(&self, session: &'s mut SqlSession) -> MapperProxy<'s, M> {
        MapperProxy::new(
            session,
            Arc::clone(&self.methods),
            Arc::clone(&self.method_cache),
        )
    }

    /// Methods bound so far.
    #[must_use]
    pub fn cached_methods(&self) -> usize {
        self.method_cache
            .lock()
            .map_or(0, |cache| cache.len())
    }
}

impl<M: Mapper> Default for MapperProxyFactory<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for MapperProxyFactory<M> {
    fn clone(&self) -> Self {
        Self {
            methods: Arc::clone(&self.methods),
            method_cache: Arc::clone(&self.method_cache),
            _mapper: PhantomData,
        }
    }
}

/// Type-erased factory entry.
#[derive(Clone)]
struct KnownMapper {
    name: &'static str,
    methods: Arc<Vec<MethodDecl>>,
    method_cache: MethodCache,
}

/// One proxy factory per mapper type, owned by the configuration.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    known_mappers: HashMap<TypeId, KnownMapper>,
}

impl MapperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if `M` is already registered; the existing
    /// registration is left as it was.
    pub fn add_mapper<M: Mapper>(&mut self) -> Result<(), SqlMapperError> {
        if self.has_mapper::<M>() {
            return Err(SqlMapperError::BindingError(format!(
                "Type {} is already known to the MapperRegistry.",
                M::NAME
            )));
        }
        let factory = MapperProxyFactory::<M>::new();
        self.known_mappers.insert(
            TypeId::of::<M>(),
            KnownMapper {
                name: M::NAME,
                methods: factory.methods,
                method_cache: factory.method_cache,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn has_mapper<M: Mapper>(&self) -> bool {
        self.known_mappers.contains_key(&TypeId::of::<M>())
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if `M` was never registered.
    pub fn factory<M: Mapper>(&self) -> Result<MapperProxyFactory<M>, SqlMapperError> {
        let known = self.known_mappers.get(&TypeId::of::<M>()).ok_or_else(|| {
            SqlMapperError::BindingError(format!(
                "Type {} is not known to the MapperRegistry.",
                M::NAME
            ))
        })?;
        Ok(MapperProxyFactory {
            methods: Arc::clone(&known.methods),
            method_cache: Arc::clone(&known.method_cache),
            _mapper: PhantomData,
        })
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if `M` was never registered.
    pub fn get_mapper<'s, M: Mapper>(
        &self,
        session: &'s mut SqlSession,
    ) -> Result<MapperProxy<'s, M>, SqlMapperError> {
        Ok(self.factory::<M>()?.new_instance(session))
    }

    /// Namespaces of every registered mapper, sorted.
    #[must_use]
    pub fn mapper_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.known_mappers.values().map(|m| m.name).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("mappers", &self.mapper_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Users;

    impl Mapper for Users {
        const NAME: &'static str = "users";

        fn methods() -> Vec<MethodDecl> {
            vec![MethodDecl::new("find").positional()]
        }
    }

    #[test]
    fn second_registration_fails_and_keeps_the_first() {
        let mut registry = MapperRegistry::new();
        registry.add_mapper::<Users>().unwrap();
        let before = registry.factory::<Users>().unwrap();
        let err = registry.add_mapper::<Users>().unwrap_err();
        assert!(err.is_binding_error());
        let after = registry.factory::<Users>().unwrap();
        assert!(Arc::ptr_eq(&before.method_cache, &after.method_cache));
        assert_eq!(registry.mapper_names(), vec!["users"]);
    }

    #[test]
    fn unknown_mapper_is_a_binding_error() {
        let registry = MapperRegistry::new();
        assert!(registry.factory::<Users>().is_err());
    }
}
