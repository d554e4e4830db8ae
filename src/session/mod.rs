//! Configuration, session factory and sessions: the public entry points.

mod configuration;
mod environment;
mod factory;
mod settings;
mod sql_session;

pub use configuration::{CacheRefResolver, Configuration, ConfigurationBuilder, Namespace};
pub use environment::Environment;
pub use factory::SqlSessionFactory;
pub use settings::Settings;
pub use sql_session::SqlSession;
