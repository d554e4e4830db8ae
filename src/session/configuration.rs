use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::environment::Environment;
use super::settings::Settings;
use crate::binding::{Mapper, MapperRegistry};
use crate::cache::{CacheSettings, SharedCache};
use crate::error::SqlMapperError;
use crate::executor::{
    BatchExecutor, CachingExecutor, Executor, ExecutorSettings, ExecutorType, Interceptor,
    InterceptorChain, ReuseExecutor, SimpleExecutor,
};
use crate::mapping::{MappedStatement, RawSqlSource, SqlCommandType};
use crate::transaction::Transaction;

enum StatementEntry {
    Statement(Arc<MappedStatement>),
    /// A short id shared by statements of several namespaces.
    Ambiguous(Vec<String>),
}

/// Immutable setup shared by every session of a factory.
pub struct Configuration {
    settings: Settings,
    environment: Option<Environment>,
    mapped_statements: HashMap<String, StatementEntry>,
    caches: HashMap<String, SharedCache>,
    mapper_registry: MapperRegistry,
    interceptor_chain: InterceptorChain,
}

impl Configuration {
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    #[must_use]
    pub fn executor_settings(&self) -> ExecutorSettings {
        self.settings
            .executor_settings(self.environment.as_ref().map(Environment::id))
    }

    /// True for full ids and for short ids, ambiguous or not.
    #[must_use]
    pub fn has_statement(&self, id: &str) -> bool {
        self.mapped_statements.contains_key(id)
    }

    /// Look a statement up by full id, or by short id when only one namespace defines it.
    ///
    /// # Errors
    /// Returns `SqlMapperError::BindingError` if the id is unknown or ambiguous.
    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>, SqlMapperError> {
        match self.mapped_statements.get(id) {
            Some(StatementEntry::Statement(statement)) => Ok(Arc::clone(statement)),
            Some(StatementEntry::Ambiguous(candidates)) => Err(SqlMapperError::BindingError(format!(
                "{id} is ambiguous in Mapped Statements collection (try using the full name \
                 including the namespace, or rename one of the entries): {candidates:?}"
            ))),
            None => Err(SqlMapperError::BindingError(format!(
                "Mapped Statements collection does not contain value for {id}"
            ))),
        }
    }

    /// Full ids of every statement, sorted.
    #[must_use]
    pub fn mapped_statement_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self
            .mapped_statements
            .iter()
            .filter_map(|(id, entry)| match entry {
                StatementEntry::Statement(s) if s.id() == id => Some(id.as_str()),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The cache a namespace owns (not one it references).
    #[must_use]
    pub fn cache(&self, namespace: &str) -> Option<&SharedCache> {
        self.caches.get(namespace)
    }

    #[must_use]
    pub fn mapper_registry(&self) -> &MapperRegistry {
        &self.mapper_registry
    }

    #[must_use]
    pub fn has_mapper<M: Mapper>(&self) -> bool {
        self.mapper_registry.has_mapper::<M>()
    }

    /// Executor of the given type over `transaction`, wrapped with the namespace caches when
    /// enabled and then with every interceptor.
    #[must_use]
    pub fn new_executor(
        &self,
        transaction: Box<dyn Transaction>,
        executor_type: ExecutorType,
    ) -> Box<dyn Executor> {
        let settings = self.executor_settings();
        let mut executor: Box<dyn Executor> = match executor_type {
            ExecutorType::Simple => Box::new(SimpleExecutor::new(transaction, settings)),
            ExecutorType::Reuse => Box::new(ReuseExecutor::new(transaction, settings)),
            ExecutorType::Batch => Box::new(BatchExecutor::new(transaction, settings)),
        };
        if self.settings.cache_enabled {
            executor = Box::new(CachingExecutor::new(executor));
        }
        self.interceptor_chain.plugin_all(executor)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .field("environment", &self.environment)
            .field("mapped_statements", &self.mapped_statement_ids())
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .field("mapper_registry", &self.mapper_registry)
            .finish_non_exhaustive()
    }
}

/// Statements of one namespace plus its cache, or a reference to another namespace's cache.
#[derive(Debug)]
pub struct Namespace {
    name: String,
    statements: Vec<MappedStatement>,
    cache: Option<CacheSettings>,
    cache_ref: Option<String>,
}

impl Namespace {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: Vec::new(),
            cache: None,
            cache_ref: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Give the namespace its own cache.
    #[must_use]
    pub fn cache(mut self, settings: CacheSettings) -> Self {
        self.cache = Some(settings);
        self
    }

    /// Share the cache of `namespace`. An own cache takes precedence.
    #[must_use]
    pub fn cache_ref(mut self, namespace: impl Into<String>) -> Self {
        self.cache_ref = Some(namespace.into());
        self
    }

    /// Add a statement; a short id is qualified with the namespace.
    #[must_use]
    pub fn statement(mut self, statement: MappedStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if the SQL has a malformed `#{}` marker.
    pub fn select(self, id: &str, sql: &str) -> Result<Self, SqlMapperError> {
        self.parsed(id, SqlCommandType::Select, sql)
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if the SQL has a malformed `#{}` marker.
    pub fn insert(self, id: &str, sql: &str) -> Result<Self, SqlMapperError> {
        self.parsed(id, SqlCommandType::Insert, sql)
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if the SQL has a malformed `#{}` marker.
    pub fn update(self, id: &str, sql: &str) -> Result<Self, SqlMapperError> {
        self.parsed(id, SqlCommandType::Update, sql)
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` if the SQL has a malformed `#{}` marker.
    pub fn delete(self, id: &str, sql: &str) -> Result<Self, SqlMapperError> {
        self.parsed(id, SqlCommandType::Delete, sql)
    }

    fn parsed(self, id: &str, command_type: SqlCommandType, sql: &str) -> Result<Self, SqlMapperError> {
        let source = RawSqlSource::parse(sql)?;
        Ok(self.statement(MappedStatement::builder(id, command_type, Arc::new(source)).build()))
    }

    fn qualify(&self, id: &str) -> Result<String, SqlMapperError> {
        if let Some(local) = id.strip_prefix(&format!("{}.", self.name)) {
            if local.contains('.') {
                return Err(dots_error(id));
            }
            return Ok(id.to_owned());
        }
        if id.contains('.') {
            return Err(dots_error(id));
        }
        Ok(format!("{}.{id}", self.name))
    }
}

fn dots_error(id: &str) -> SqlMapperError {
    SqlMapperError::ConfigError(format!(
        "Dots are not allowed in element names, please remove it from {id}"
    ))
}

/// A namespace waiting for the cache of another namespace to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRefResolver {
    namespace: String,
    referenced: String,
}

impl CacheRefResolver {
    #[must_use]
    pub fn new(namespace: impl Into<String>, referenced: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            referenced: referenced.into(),
        }
    }

    /// # Errors
    /// Returns `SqlMapperError::IncompleteCacheRef` while the referenced cache is unknown.
    pub fn resolve(
        &self,
        caches: &HashMap<String, SharedCache>,
    ) -> Result<SharedCache, SqlMapperError> {
        caches.get(&self.referenced).cloned().ok_or_else(|| {
            SqlMapperError::IncompleteCacheRef(format!(
                "No cache for namespace '{}' could be found (referenced from '{}')",
                self.referenced, self.namespace
            ))
        })
    }
}

/// Collects settings, environment, namespaces, mappers and interceptors.
#[derive(Default)]
pub struct ConfigurationBuilder {
    settings: Settings,
    environment: Option<Environment>,
    namespaces: Vec<Namespace>,
    mapper_registry: MapperRegistry,
    interceptor_chain: InterceptorChain,
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor_chain.add_interceptor(interceptor);
        self
    }

    /// # Errors
    /// Returns `SqlMapperError::BindingError` if `M` was already added.
    pub fn mapper<M: Mapper>(mut self) -> Result<Self, SqlMapperError> {
        self.mapper_registry.add_mapper::<M>()?;
        Ok(self)
    }

    /// # Errors
    /// Returns `SqlMapperError::ConfigError` for duplicate caches or statement ids, dotted
    /// short ids, and cache references that never resolve.
    pub fn build(self) -> Result<Configuration, SqlMapperError> {
        let mut caches = HashMap::new();
        for namespace in &self.namespaces {
            if let Some(settings) = &namespace.cache {
                if caches.contains_key(&namespace.name) {
                    return Err(SqlMapperError::ConfigError(format!(
                        "Caches collection already contains value for {}",
                        namespace.name
                    )));
                }
                caches.insert(namespace.name.clone(), settings.builder(namespace.name.clone()).build());
            }
        }

        let effective = resolve_cache_refs(&self.namespaces, &caches)?;

        let mut mapped_statements = HashMap::new();
        for namespace in &self.namespaces {
            let cache = effective.get(&namespace.name);
            for statement in &namespace.statements {
                let id = namespace.qualify(statement.id())?;
                let cache = cache.cloned().or_else(|| statement.cache().cloned());
                let statement = Arc::new(statement.with_id_and_cache(id.clone(), cache));
                add_statement(&mut mapped_statements, id, statement)?;
            }
        }
        debug!(
            statements = mapped_statements.len(),
            caches = caches.len(),
            "configuration built"
        );

        Ok(Configuration {
            settings: self.settings,
            environment: self.environment,
            mapped_statements,
            caches,
            mapper_registry: self.mapper_registry,
            interceptor_chain: self.interceptor_chain,
        })
    }
}

/// Resolve cache references in passes until none are left or a pass makes no progress, so
/// references may be declared before the namespace they point at, and may chain.
fn resolve_cache_refs(
    namespaces: &[Namespace],
    caches: &HashMap<String, SharedCache>,
) -> Result<HashMap<String, SharedCache>, SqlMapperError> {
    let mut effective = caches.clone();
    let mut incomplete: Vec<CacheRefResolver> = namespaces
        .iter()
        .filter(|ns| ns.cache.is_none())
        .filter_map(|ns| {
            ns.cache_ref
                .as_ref()
                .map(|referenced| CacheRefResolver::new(ns.name.clone(), referenced.clone()))
        })
        .collect();
    loop {
        let before = incomplete.len();
        incomplete.retain(|resolver| match resolver.resolve(&effective) {
            Ok(cache) => {
                effective.insert(resolver.namespace.clone(), cache);
                false
            }
            Err(_) => true,
        });
        if incomplete.is_empty() || incomplete.len() == before {
            break;
        }
    }
    match incomplete.first() {
        Some(resolver) => Err(SqlMapperError::ConfigError(
            resolver
                .resolve(&effective)
                .err()
                .map_or_else(String::new, |e| e.to_string()),
        )),
        None => Ok(effective),
    }
}

fn add_statement(
    mapped_statements: &mut HashMap<String, StatementEntry>,
    id: String,
    statement: Arc<MappedStatement>,
) -> Result<(), SqlMapperError> {
    if mapped_statements.contains_key(&id) {
        return Err(SqlMapperError::ConfigError(format!(
            "Mapped Statements collection already contains value for {id}"
        )));
    }
    if let Some((_, short)) = id.rsplit_once('.') {
        match mapped_statements.get_mut(short) {
            Some(StatementEntry::Ambiguous(candidates)) => candidates.push(id.clone()),
            Some(StatementEntry::Statement(existing)) => {
                let first = existing.id().to_owned();
                mapped_statements.insert(
                    short.to_owned(),
                    StatementEntry::Ambiguous(vec![first, id.clone()]),
                );
            }
            None => {
                mapped_statements.insert(
                    short.to_owned(),
                    StatementEntry::Statement(Arc::clone(&statement)),
                );
            }
        }
    }
    mapped_statements.insert(id, StatementEntry::Statement(statement));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Namespace {
        Namespace::new("app.users")
            .select("find", "select * from users where id = #{id}")
            .unwrap()
            .insert("add", "insert into users(name) values (#{name})")
            .unwrap()
    }

    #[test]
    fn statements_resolve_by_full_and_short_id() {
        let config = Configuration::builder().namespace(users()).build().unwrap();
        assert_eq!(config.mapped_statement("app.users.find").unwrap().id(), "app.users.find");
        assert_eq!(config.mapped_statement("find").unwrap().id(), "app.users.find");
        assert_eq!(config.mapped_statement_ids(), vec!["app.users.add", "app.users.find"]);
    }

    #[test]
    fn shared_short_id_is_ambiguous() {
        let orders = Namespace::new("app.orders")
            .select("find", "select * from orders where id = #{id}")
            .unwrap();
        let config = Configuration::builder()
            .namespace(users())
            .namespace(orders)
            .build()
            .unwrap();
        let err = config.mapped_statement("find").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        assert!(config.mapped_statement("app.orders.find").is_ok());
    }

    #[test]
    fn duplicate_full_id_is_rejected() {
        let dup = Namespace::new("app.users").select("find", "select 1").unwrap();
        let err = Configuration::builder()
            .namespace(users())
            .namespace(dup)
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(_)));
    }

    #[test]
    fn foreign_dotted_id_is_rejected() {
        let ns = Namespace::new("a").select("b.find", "select 1").unwrap();
        assert!(Configuration::builder().namespace(ns).build().is_err());
    }

    #[test]
    fn cache_refs_resolve_in_any_order_and_chain() {
        let config = Configuration::builder()
            .namespace(Namespace::new("c").cache_ref("b").select("q", "select 1").unwrap())
            .namespace(Namespace::new("b").cache_ref("a"))
            .namespace(Namespace::new("a").cache(CacheSettings::default()))
            .build()
            .unwrap();
        let statement = config.mapped_statement("c.q").unwrap();
        let cache = statement.cache().unwrap();
        assert!(cache.ptr_eq(config.cache("a").unwrap()));
        assert!(config.cache("c").is_none());
    }

    #[test]
    fn unresolvable_cache_ref_is_a_config_error() {
        let err = Configuration::builder()
            .namespace(Namespace::new("x").cache_ref("missing"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(ref m) if m.contains("missing")));
    }
}
