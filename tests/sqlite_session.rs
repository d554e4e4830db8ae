use std::sync::Arc;

use sql_mapper::executor::BATCH_UPDATE_RETURN_VALUE;
use sql_mapper::prelude::*;
use tempfile::TempDir;
use tracing::Level;

struct UserMapper;

impl Mapper for UserMapper {
    const NAME: &'static str = "app.users";

    fn methods() -> Vec<MethodDecl> {
        vec![
            MethodDecl::new("add")
                .named("name")
                .returns(ReturnType::Boxed(ScalarType::Bool)),
            MethodDecl::new("count").returns(ReturnType::Primitive(ScalarType::Long)),
            MethodDecl::new("page").row_bounds().returns(ReturnType::List),
        ]
    }
}

struct User {
    id: i64,
    name: String,
}

impl FromRow for User {
    fn from_row(row: &CustomDbRow) -> Result<Self, SqlMapperError> {
        Ok(User {
            id: *row.try_get("id")?.as_int().unwrap_or(&0),
            name: row.try_get("name")?.as_text().unwrap_or_default().to_string(),
        })
    }
}

/// Route library logs to the test harness output; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .try_init();
}

async fn factory(dir: &TempDir) -> SqlSessionFactory {
    init_tracing();
    let path = dir.path().join("app.db");
    let data_source = SqliteDataSource::new(SqliteOptions::new(path.to_string_lossy()))
        .await
        .unwrap();
    let environment = Environment::new(
        "sqlite",
        Arc::new(LocalTransactionFactory::default()),
        Arc::new(data_source),
    );
    let users = Namespace::new("app.users")
        .cache(CacheSettings::default())
        .update(
            "create_table",
            "create table if not exists users (id integer primary key, name text not null)",
        )
        .unwrap()
        .insert("add", "insert into users(name) values (#{name})")
        .unwrap()
        .select("find", "select id, name from users where id = #{id}")
        .unwrap()
        .select("all", "select id, name from users order by id")
        .unwrap()
        .select("page", "select id, name from users order by id")
        .unwrap()
        .select("count", "select count(*) from users")
        .unwrap()
        .delete("remove_all", "delete from users")
        .unwrap()
        .statement(
            MappedStatement::builder(
                "count_proc",
                SqlCommandType::Select,
                Arc::new(RawSqlSource::parse("{call count_users()}").unwrap()),
            )
            .statement_type(StatementType::Callable)
            .build(),
        );
    let configuration = Configuration::builder()
        .environment(environment)
        .namespace(users)
        .mapper::<UserMapper>()
        .unwrap()
        .build()
        .unwrap();
    let factory = SqlSessionFactory::new(configuration);

    let mut session = factory.open_session().unwrap();
    session.update("app.users.create_table", ParamValue::Null).await.unwrap();
    session.commit().await.unwrap();
    session.close().await;
    factory
}

async fn count(factory: &SqlSessionFactory) -> i64 {
    let mut session = factory.open_session().unwrap();
    let row = session.select_one("app.users.count", ParamValue::Null).await.unwrap().unwrap();
    session.close().await;
    *row.get_by_index(0).and_then(RowValues::as_int).unwrap()
}

#[tokio::test]
async fn committed_rows_are_visible_to_later_sessions() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory.open_session().unwrap();
    for name in ["alice", "bob"] {
        let added = session
            .insert("app.users.add", ParamValue::record([("name", name)]))
            .await
            .unwrap();
        assert_eq!(added, 1);
    }
    session.commit().await.unwrap();
    session.close().await;

    let mut session = factory.open_session().unwrap();
    let users: Vec<User> = session
        .select_list("app.users.all", ParamValue::Null)
        .await
        .unwrap()
        .iter()
        .map(User::from_row)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "bob");
    let alice: Option<User> = session.select_one_as("app.users.find", users[0].id).await.unwrap();
    assert_eq!(alice.map(|u| u.name).as_deref(), Some("alice"));
    session.close().await;
}

#[tokio::test]
async fn rollback_discards_uncommitted_writes() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory.open_session().unwrap();
    session
        .insert("app.users.add", ParamValue::record([("name", "carol")]))
        .await
        .unwrap();
    session.rollback().await.unwrap();
    session.close().await;

    let mut session = factory.open_session().unwrap();
    session
        .insert("app.users.add", ParamValue::record([("name", "dave")]))
        .await
        .unwrap();
    session.close().await;

    assert_eq!(count(&factory).await, 0);
}

#[tokio::test]
async fn batch_session_writes_on_flush() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory
        .open_session_with(ExecutorType::Batch, None, false)
        .unwrap();
    for name in ["a", "b", "c"] {
        let queued = session
            .insert("app.users.add", ParamValue::record([("name", name)]))
            .await
            .unwrap();
        assert_eq!(queued, BATCH_UPDATE_RETURN_VALUE);
    }
    let results = session.flush_statements().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].update_counts(), &[1, 1, 1]);
    session.commit().await.unwrap();
    session.close().await;

    assert_eq!(count(&factory).await, 3);
}

#[tokio::test]
async fn reuse_session_inserts_with_one_statement() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory
        .open_session_with(ExecutorType::Reuse, None, false)
        .unwrap();
    for name in ["a", "b"] {
        session
            .insert("app.users.add", ParamValue::record([("name", name)]))
            .await
            .unwrap();
    }
    session.commit().await.unwrap();
    session.close().await;

    assert_eq!(count(&factory).await, 2);
}

#[tokio::test]
async fn committed_write_invalidates_the_namespace_cache() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory.open_session().unwrap();
    session
        .insert("app.users.add", ParamValue::record([("name", "erin")]))
        .await
        .unwrap();
    session.commit().await.unwrap();
    assert!(session.select_one("app.users.find", 1_i64).await.unwrap().is_some());
    session.commit().await.unwrap();
    session.close().await;
    let cache = factory.configuration().cache("app.users").unwrap().clone();
    assert_eq!(cache.len(), 1);

    let mut session = factory.open_session().unwrap();
    session.delete("app.users.remove_all", ParamValue::Null).await.unwrap();
    session.commit().await.unwrap();
    session.close().await;
    assert!(cache.is_empty());

    let mut session = factory.open_session().unwrap();
    assert!(session.select_one("app.users.find", 1_i64).await.unwrap().is_none());
    session.close().await;
}

#[tokio::test]
async fn mapper_binds_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory.open_session().unwrap();
    let mut users = session.get_mapper::<UserMapper>().unwrap();
    for name in ["a", "b", "c"] {
        let added = users.invoke("add", vec![Arg::value(name)]).await.unwrap();
        assert_eq!(added.as_bool(), Some(true));
    }
    let total = users.invoke("count", vec![]).await.unwrap();
    assert_eq!(total.as_long(), Some(3));
    let page = users
        .invoke("page", vec![Arg::RowBounds(RowBounds::new(1, 1))])
        .await
        .unwrap()
        .into_typed_list::<User>()
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "b");
    users.session().commit().await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn stored_procedures_are_not_supported() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir).await;

    let mut session = factory.open_session().unwrap();
    let err = session
        .select_list("app.users.count_proc", ParamValue::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlMapperError::Unimplemented(_)));
    session.close().await;
}
