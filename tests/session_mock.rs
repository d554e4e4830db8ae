use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sql_mapper::executor::BATCH_UPDATE_RETURN_VALUE;
use sql_mapper::prelude::*;
use sql_mapper::test_utils::{DriverEvent, MockDataSource};
use tracing::Level;

struct UserMapper;

impl Mapper for UserMapper {
    const NAME: &'static str = "app.users";

    fn methods() -> Vec<MethodDecl> {
        vec![
            MethodDecl::new("find").named("id").returns(ReturnType::Row),
            MethodDecl::new("all").returns(ReturnType::List),
            MethodDecl::new("by_id").returns(ReturnType::Map).map_key("id"),
            MethodDecl::new("add")
                .positional()
                .returns(ReturnType::Primitive(ScalarType::Int)),
            MethodDecl::new("remove")
                .named("id")
                .returns(ReturnType::Boxed(ScalarType::Bool)),
            MethodDecl::new("count").returns(ReturnType::Primitive(ScalarType::Long)),
            MethodDecl::new("count_boxed").returns(ReturnType::Boxed(ScalarType::Long)),
            MethodDecl::new("flush").flush().returns(ReturnType::List),
        ]
    }
}

struct UnregisteredMapper;

impl Mapper for UnregisteredMapper {
    const NAME: &'static str = "app.other";

    fn methods() -> Vec<MethodDecl> {
        Vec::new()
    }
}

fn users_namespace() -> Namespace {
    Namespace::new("app.users")
        .cache(CacheSettings::default())
        .select("find", "select * from users where id = #{id}")
        .unwrap()
        .select("all", "select * from users order by id")
        .unwrap()
        .select("by_id", "select * from users order by id")
        .unwrap()
        .select("count", "select count(*) from users where active = 1")
        .unwrap()
        .select("count_boxed", "select count(*) from users where active = 1")
        .unwrap()
        .insert("add", "insert into users(name) values (#{name})")
        .unwrap()
        .delete("remove", "delete from users where id = #{id}")
        .unwrap()
}

/// Route library logs to the test harness output; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .try_init();
}

fn mock() -> MockDataSource {
    init_tracing();
    let ds = MockDataSource::new();
    ds.respond_to_query(
        "select * from users",
        &["id", "name"],
        vec![
            vec![1_i64.into(), "alice".into()],
            vec![2_i64.into(), "bob".into()],
        ],
    );
    ds.respond_to_query(
        "select * from users where",
        &["id", "name"],
        vec![vec![1_i64.into(), "alice".into()]],
    );
    ds
}

fn factory_with(ds: &MockDataSource, settings: Settings) -> SqlSessionFactory {
    let environment = Environment::new(
        "test",
        Arc::new(LocalTransactionFactory::default()),
        Arc::new(ds.clone()),
    );
    let configuration = Configuration::builder()
        .settings(settings)
        .environment(environment)
        .namespace(users_namespace())
        .mapper::<UserMapper>()
        .unwrap()
        .build()
        .unwrap();
    SqlSessionFactory::new(configuration)
}

fn factory(ds: &MockDataSource) -> SqlSessionFactory {
    factory_with(ds, Settings::default())
}

#[tokio::test]
async fn mapper_calls_run_their_bound_statements() {
    let ds = mock();
    ds.respond_to_update("delete", 0);
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let mut users = session.get_mapper::<UserMapper>().unwrap();

    let found = users
        .invoke("find", vec![Arg::value(1_i64)])
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(found.get("name"), Some(&RowValues::Text("alice".into())));

    let all = users.invoke("all", vec![]).await.unwrap().into_list().unwrap();
    assert_eq!(all.len(), 2);

    let by_id = users.invoke("by_id", vec![]).await.unwrap().into_map().unwrap();
    assert_eq!(
        by_id.get(&RowValues::Int(2)).and_then(|r| r.get("name")),
        Some(&RowValues::Text("bob".into()))
    );

    let added = users
        .invoke("add", vec![Arg::value(ParamValue::record([("name", "carol")]))])
        .await
        .unwrap();
    assert_eq!(added.as_int(), Some(1));

    let removed = users.invoke("remove", vec![Arg::value(9_i64)]).await.unwrap();
    assert_eq!(removed.as_bool(), Some(false));

    assert!(users.session().is_dirty());
    users.session().commit().await.unwrap();
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 1);
    session.close().await;
}

#[tokio::test]
async fn named_parameter_is_bound_by_name() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    session
        .get_mapper::<UserMapper>()
        .unwrap()
        .invoke("find", vec![Arg::value(42_i64)])
        .await
        .unwrap();
    assert!(ds.events().contains(&DriverEvent::Bind {
        sql: "select * from users where id = ?".into(),
        index: 1,
        value: RowValues::Int(42),
    }));
    session.close().await;
}

#[tokio::test]
async fn primitive_return_without_a_row_is_a_binding_error() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let err = session
        .get_mapper::<UserMapper>()
        .unwrap()
        .invoke("count", vec![])
        .await
        .unwrap_err();
    assert!(err.is_binding_error());
    assert!(err.to_string().contains("attempted to return null"));
    session.close().await;
}

#[tokio::test]
async fn boxed_return_without_a_row_is_null() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let value = session
        .get_mapper::<UserMapper>()
        .unwrap()
        .invoke("count_boxed", vec![])
        .await
        .unwrap();
    assert!(value.is_null());
    assert_eq!(value.as_long(), None);
    session.close().await;
}

#[tokio::test]
async fn undeclared_method_and_unknown_mapper_are_rejected() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let err = session
        .get_mapper::<UserMapper>()
        .unwrap()
        .invoke("missing", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlMapperError::BindingError(_)));
    assert!(session.get_mapper::<UnregisteredMapper>().is_err());
    session.close().await;
}

#[tokio::test]
async fn second_level_cache_is_shared_after_commit() {
    let ds = mock();
    let factory = factory(&ds);

    let mut first = factory.open_session().unwrap();
    first.select_one("app.users.find", 1_i64).await.unwrap();
    first.commit().await.unwrap();
    first.close().await;

    let mut second = factory.open_session().unwrap();
    let row = second.select_one("find", 1_i64).await.unwrap().unwrap();
    assert_eq!(row.get("id"), Some(&RowValues::Int(1)));
    second.close().await;

    let queries = ds.count(|e| {
        matches!(e, DriverEvent::ExecuteQuery { sql } if sql.starts_with("select * from users where"))
    });
    assert_eq!(queries, 1);
    let cache = factory.configuration().cache("app.users").unwrap();
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn disabled_cache_setting_skips_the_second_level() {
    let ds = mock();
    let settings = Settings {
        cache_enabled: false,
        ..Settings::default()
    };
    let factory = factory_with(&ds, settings);
    for _ in 0..2 {
        let mut session = factory.open_session().unwrap();
        session.select_one("app.users.find", 1_i64).await.unwrap();
        session.commit().await.unwrap();
        session.close().await;
    }
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::ExecuteQuery { .. })), 2);
}

#[tokio::test]
async fn select_one_rejects_several_rows() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let err = session.select_one("app.users.all", ParamValue::Null).await.unwrap_err();
    assert!(matches!(err, SqlMapperError::TooManyResults(2)));
    session.close().await;
}

#[tokio::test]
async fn closing_a_dirty_session_rolls_back() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    session
        .insert("app.users.add", ParamValue::record([("name", "dave")]))
        .await
        .unwrap();
    session.close().await;
    session.close().await;
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Rollback)), 1);
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 0);
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Close)), 1);
}

#[tokio::test]
async fn clean_session_commits_only_when_forced() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    session.select_list("app.users.all", ParamValue::Null).await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 0);
    session.commit_force(true).await.unwrap();
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 1);
    session.close().await;
}

#[tokio::test]
async fn batch_session_queues_until_flushed() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory
        .open_session_with(ExecutorType::Batch, None, false)
        .unwrap();
    let mut users = session.get_mapper::<UserMapper>().unwrap();
    for name in ["a", "b"] {
        let queued = users
            .invoke("add", vec![Arg::value(ParamValue::record([("name", name)]))])
            .await
            .unwrap();
        assert_eq!(queued.as_int().map(i64::from), Some(BATCH_UPDATE_RETURN_VALUE));
    }
    let results = users
        .invoke("flush", vec![])
        .await
        .unwrap()
        .into_batch_results()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].statement_id(), "app.users.add");
    assert_eq!(results[0].update_counts(), &[1, 1]);
    session.close().await;
}

#[tokio::test]
async fn paged_select_skips_and_limits() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let rows = session
        .select_list_with_bounds("app.users.all", ParamValue::Null, RowBounds::new(1, 5))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&RowValues::Int(2)));
    session.close().await;
}

#[tokio::test]
async fn result_handler_streams_rows() {
    let ds = mock();
    let factory = factory(&ds);
    let mut session = factory.open_session().unwrap();
    let mut handler = DefaultResultHandler::default();
    session
        .select("app.users.all", ParamValue::Null, RowBounds::DEFAULT, &mut handler)
        .await
        .unwrap();
    assert_eq!(handler.into_result_list().len(), 2);
    session.close().await;
}

struct CountingInterceptor(Arc<AtomicUsize>);

impl Interceptor for CountingInterceptor {
    fn plugin(&self, executor: Box<dyn Executor>) -> Box<dyn Executor> {
        self.0.fetch_add(1, Ordering::SeqCst);
        executor
    }
}

#[tokio::test]
async fn interceptors_wrap_every_new_executor() {
    let ds = mock();
    let plugged = Arc::new(AtomicUsize::new(0));
    let environment = Environment::new(
        "test",
        Arc::new(LocalTransactionFactory::default()),
        Arc::new(ds.clone()),
    );
    let configuration = Configuration::builder()
        .environment(environment)
        .interceptor(Arc::new(CountingInterceptor(Arc::clone(&plugged))))
        .build()
        .unwrap();
    let factory = SqlSessionFactory::new(configuration);
    factory.open_session().unwrap().close().await;
    factory.open_session().unwrap().close().await;
    assert_eq!(plugged.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn session_needs_an_environment() {
    let factory = SqlSessionFactory::new(Configuration::builder().build().unwrap());
    let err = factory.open_session().unwrap_err();
    assert!(matches!(err, SqlMapperError::ConfigError(_)));
}

#[tokio::test]
async fn session_over_caller_connection_follows_its_auto_commit() {
    let ds = mock();
    let factory = factory(&ds);
    let connection = ds.get_connection().await.unwrap();
    let mut session = factory
        .open_session_with_connection(ExecutorType::Simple, connection)
        .await;
    session
        .insert("app.users.add", ParamValue::record([("name", "erin")]))
        .await
        .unwrap();
    session.commit().await.unwrap();
    session.close().await;
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Commit)), 0);
    assert_eq!(ds.count(|e| matches!(e, DriverEvent::Rollback)), 0);
}
