mod common;

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use common::{count_rows, create_test_db, insert_user, posts_table, users_table};
use typed_sqlite::prelude::*;

#[derive(Debug, PartialEq)]
struct User {
    id: i64,
    name: Option<String>,
    email: String,
    age: Option<i32>,
}

impl FromRow for User {
    fn from_row(row: &Row<'_>) -> typed_sqlite::Result<Self> {
        Ok(Self {
            id: row.get_by_name("id")?,
            name: row.get_by_name("name")?,
            email: row.get_by_name("email")?,
            age: row.get_by_name("age")?,
        })
    }
}

#[tokio::test]
async fn test_insert_then_select_by_rowid() {
    test_insert_then_select_by_rowid_impl().unwrap();
}

fn test_insert_then_select_by_rowid_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let id = users.column::<Integer>("id")?;
    let name = users.column::<Nullable<Text>>("name")?;

    let rowid = insert_user(&conn, "Alice", "alice@mac.com", None)?;
    assert_eq!(conn.last_insert_rowid(), rowid);
    assert_eq!(conn.changes(), 1);

    let rows: Vec<(Option<String>,)> =
        conn.fetch_all(users.select().column(&name).filter(id.eq(rowid)))?;
    assert_eq!(rows, vec![(Some("Alice".to_string()),)]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_email_is_a_constraint_error() {
    test_duplicate_email_is_a_constraint_error_impl().unwrap();
}

fn test_duplicate_email_is_a_constraint_error_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    insert_user(&conn, "Alice", "alice@mac.com", None)?;

    let err = insert_user(&conn, "Alicia", "alice@mac.com", None).unwrap_err();
    match &err {
        Error::Engine { code, message } => {
            assert_eq!(code & 0xff, 19);
            assert!(message.contains("UNIQUE"), "unexpected message: {message}");
        }
        other => panic!("expected an engine error, got {other:?}"),
    }
    assert!(err.is_constraint_violation());
    assert!(!err.is_retryable());
    assert_eq!(count_rows(&conn, &users)?, 1);
    Ok(())
}

#[tokio::test]
async fn test_count_tracks_inserts() {
    test_count_tracks_inserts_impl().unwrap();
}

fn test_count_tracks_inserts_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    assert_eq!(count_rows(&conn, &users)?, 0);
    for i in 0..5 {
        insert_user(&conn, "user", &format!("user{i}@example.com"), Some(20 + i))?;
    }
    assert_eq!(count_rows(&conn, &users)?, 5);
    Ok(())
}

#[tokio::test]
async fn test_basic_operations() {
    test_basic_operations_impl().unwrap();
}

fn test_basic_operations_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let id = users.column::<Integer>("id")?;
    let age = users.column::<Nullable<Integer>>("age")?;

    let john = insert_user(&conn, "John Doe", "john@example.com", Some(30))?;

    let user: User = conn.fetch_one(users.select().filter(id.eq(john)))?;
    assert_eq!(
        user,
        User {
            id: john,
            name: Some("John Doe".to_string()),
            email: "john@example.com".to_string(),
            age: Some(30),
        }
    );

    let updated = conn.execute(users.update().set(age.to(&age + 1)).filter(id.eq(john)))?;
    assert_eq!(updated.changes, 1);
    let new_age: Option<i32> = conn.scalar(users.select().column(&age).filter(id.eq(john)))?;
    assert_eq!(new_age, Some(31));

    let deleted = conn.execute(users.delete().filter(id.eq(john)))?;
    assert_eq!(deleted.changes, 1);
    let missing: Option<User> = conn.fetch_optional(users.select().filter(id.eq(john)))?;
    assert!(missing.is_none());
    assert!(matches!(
        conn.fetch_one::<User, _>(users.select().filter(id.eq(john))),
        Err(Error::NoRows)
    ));
    Ok(())
}

#[tokio::test]
async fn test_multi_row_insert_and_ordering() {
    test_multi_row_insert_and_ordering_impl().unwrap();
}

fn test_multi_row_insert_and_ordering_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let name = users.column::<Nullable<Text>>("name")?;
    let email = users.column::<Text>("email")?;
    let age = users.column::<Nullable<Integer>>("age")?;

    let result = conn.execute(
        users
            .insert()
            .values([email.to("c@x.io"), name.to(Some("Carol")), age.to(Some(41))])
            .values([name.to(Some("Bob")), email.to("b@x.io"), age.to(None::<i64>)])
            .values([age.to(Some(29)), email.to("a@x.io"), name.to(Some("Ann"))]),
    )?;
    assert_eq!(result.changes, 3);

    let names: Vec<(String, Option<i64>)> = conn.fetch_all(
        users
            .select()
            .column(&email)
            .column(&age)
            .filter(age.is_not_null())
            .order_by(age.desc())
            .limit(10),
    )?;
    assert_eq!(
        names,
        vec![("c@x.io".to_string(), Some(41)), ("a@x.io".to_string(), Some(29))]
    );

    let page: Vec<(String,)> =
        conn.fetch_all(users.select().column(&email).order_by(email.asc()).limit(1).offset(1))?;
    assert_eq!(page, vec![("b@x.io".to_string(),)]);
    Ok(())
}

#[tokio::test]
async fn test_join_and_aggregate() {
    test_join_and_aggregate_impl().unwrap();
}

fn test_join_and_aggregate_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let posts = posts_table();
    let ann = insert_user(&conn, "Ann", "ann@x.io", Some(30))?;
    let bob = insert_user(&conn, "Bob", "bob@x.io", Some(40))?;
    insert_user(&conn, "Cid", "cid@x.io", None)?;

    let user_id = posts.column::<Integer>("user_id")?;
    let title = posts.column::<Text>("title")?;
    let score = posts.column::<Real>("score")?;
    for (author, post_title, post_score) in [(ann, "a1", 1.5), (ann, "a2", 2.5), (bob, "b1", 4.0)] {
        conn.execute(posts.insert().values([
            user_id.to(author),
            title.to(post_title),
            score.to(post_score),
        ]))?;
    }

    let id = users.column::<Integer>("id")?;
    let name = users.column::<Nullable<Text>>("name")?;
    let totals: Vec<(Option<String>, i64, f64)> = conn.fetch_all(
        users
            .select()
            .column(&name)
            .column_as(count(&title), "posts")
            .column_as(total(&score), "total_score")
            .left_join(&posts, user_id.eq(&id))
            .group_by(&name)
            .order_by(col::<Integer>("posts").desc())
            .order_by(name.asc()),
    )?;
    assert_eq!(
        totals,
        vec![
            (Some("Ann".to_string()), 2, 4.0),
            (Some("Bob".to_string()), 1, 4.0),
            (Some("Cid".to_string()), 0, 0.0),
        ]
    );

    let prolific: Vec<(String,)> = conn.fetch_all(
        users
            .select()
            .column(users.column::<Text>("email")?.expr())
            .inner_join(&posts, user_id.eq(&id))
            .group_by(&id)
            .having(count_star().gt(1)),
    )?;
    assert_eq!(prolific, vec![("ann@x.io".to_string(),)]);
    Ok(())
}

#[tokio::test]
async fn test_subqueries() {
    test_subqueries_impl().unwrap();
}

fn test_subqueries_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let posts = posts_table();
    let ann = insert_user(&conn, "Ann", "ann@x.io", None)?;
    insert_user(&conn, "Bob", "bob@x.io", None)?;

    let user_id = posts.column::<Integer>("user_id")?;
    let title = posts.column::<Text>("title")?;
    conn.execute(posts.insert().values([user_id.to(ann), title.to("hello")]))?;

    let id = users.column::<Integer>("id")?;
    let email = users.column::<Text>("email")?;

    let with_posts: Vec<(String,)> = conn.fetch_all(
        users
            .select()
            .column(&email)
            .filter(exists(posts.select().filter(user_id.eq(&id)))),
    )?;
    assert_eq!(with_posts, vec![("ann@x.io".to_string(),)]);

    let without_posts: Vec<(String,)> = conn.fetch_all(
        users
            .select()
            .column(&email)
            .filter(id.not_in_query(posts.select().column(&user_id))),
    )?;
    assert_eq!(without_posts, vec![("bob@x.io".to_string(),)]);

    let post_count = Expr::<Integer>::subquery(posts.select().column(count_star()).filter(user_id.eq(&id)));
    let counts: Vec<(String, i64)> = conn.fetch_all(
        users
            .select()
            .column(&email)
            .column_as(post_count, "n")
            .order_by(email.asc()),
    )?;
    assert_eq!(counts, vec![("ann@x.io".to_string(), 1), ("bob@x.io".to_string(), 0)]);
    Ok(())
}

#[tokio::test]
async fn test_conflict_policies() {
    test_conflict_policies_impl().unwrap();
}

fn test_conflict_policies_impl() -> Result<()> {
    let conn = create_test_db()?;
    let users = users_table();
    let email = users.column::<Text>("email")?;
    let name = users.column::<Nullable<Text>>("name")?;
    insert_user(&conn, "Ann", "ann@x.io", None)?;

    let ignored = conn.execute(users.insert().or_ignore().values([email.to("ann@x.io")]))?;
    assert_eq!(ignored.changes, 0);

    conn.execute(
        users
            .insert()
            .or_replace()
            .values([email.to("ann@x.io"), name.to(Some("Annie"))]),
    )?;
    let names: Vec<(Option<String>,)> = conn.fetch_all(users.select().column(&name))?;
    assert_eq!(names, vec![(Some("Annie".to_string()),)]);
    Ok(())
}

#[tokio::test]
async fn test_row_access_and_decoding() {
    test_row_access_and_decoding_impl().unwrap();
}

fn test_row_access_and_decoding_impl() -> Result<()> {
    let conn = create_test_db()?;
    insert_user(&conn, "Ann", "ann@x.io", Some(300))?;
    let users = users_table();
    let age = users.column::<Nullable<Integer>>("age")?;
    let name = users.column::<Nullable<Text>>("name")?;

    let mut visited = 0;
    conn.for_each(users.select().column_as(&age, "Age").column(&name), |row| {
        visited += 1;
        assert_eq!(row.column_names(), ["Age", "name"]);
        assert_eq!(row.storage_class(0)?, StorageClass::Integer);
        assert_eq!(row.get_by_name::<i64>("Age")?, 300);
        assert!(matches!(
            row.get_by_name::<i64>("age"),
            Err(Error::Decode(DecodeError::UnknownColumn(_)))
        ));
        assert!(matches!(
            row.get::<u8>(0),
            Err(Error::Decode(DecodeError::OutOfRange { value: 300, .. }))
        ));
        assert!(matches!(
            row.get::<i64>(1),
            Err(Error::Decode(DecodeError::TypeMismatch { .. }))
        ));
        assert!(matches!(
            row.get::<String>(5),
            Err(Error::Decode(DecodeError::ColumnIndexOutOfRange { index: 5, count: 2 }))
        ));
        Ok(())
    })?;
    assert_eq!(visited, 1);

    insert_user(&conn, "Nobody", "nobody@x.io", None)?;
    let ages: Vec<(Option<i64>,)> = conn.fetch_all(users.select().column(&age).order_by(age.asc()))?;
    assert_eq!(ages, vec![(None,), (Some(300),)]);
    let err = conn
        .fetch_all::<(i64,), _>(users.select().column(&age).order_by(age.asc()))
        .unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::UnexpectedNull(_))));
    Ok(())
}

#[tokio::test]
async fn test_row_maps_export_as_json() {
    test_row_maps_export_as_json_impl().unwrap();
}

fn test_row_maps_export_as_json_impl() -> Result<()> {
    let conn = create_test_db()?;
    insert_user(&conn, "Ann", "ann@x.io", Some(30))?;
    let users = users_table();

    let rows: Vec<HashMap<String, Value>> = conn.fetch_all(users.select())?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["email"], Value::Text("ann@x.io".into()));
    assert_eq!(rows[0]["age"], Value::Integer(30));

    let json = serde_json::to_value(&rows[0])?;
    assert_eq!(json["email"], serde_json::json!({ "Text": "ann@x.io" }));
    let back: HashMap<String, Value> = serde_json::from_value(json)?;
    assert_eq!(back, rows[0]);

    let values: Vec<Value> = conn.fetch_one(users.select())?;
    assert_eq!(values.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_dates_and_blobs_round_trip() {
    test_dates_and_blobs_round_trip_impl().unwrap();
}

fn test_dates_and_blobs_round_trip_impl() -> Result<()> {
    let conn = create_test_db()?;
    let events = TableDefinition::new("events")
        .column(ColumnDefinition::new::<Integer>("id").primary_key())
        .column(ColumnDefinition::new::<Text>("day"))
        .column(ColumnDefinition::new::<Blob>("payload"))
        .column(ColumnDefinition::new::<Bool>("done").default(DefaultValue::Integer(0)))
        .build()?;
    conn.execute(events.create())?;

    let day = events.column::<Text>("day")?;
    let payload = events.column::<Blob>("payload")?;
    let done = events.column::<Bool>("done")?;
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
    conn.execute(events.insert().values([day.to(date), payload.to(vec![0u8, 159, 146, 150])]))?;
    conn.execute(events.update().set(done.to(true)).filter(day.eq(date)))?;

    let (stored_day, stored_payload, stored_done): (NaiveDate, Vec<u8>, bool) = conn.fetch_one(
        events
            .select()
            .column(&day)
            .column(&payload)
            .column(&done)
            .filter(done.eq(true)),
    )?;
    assert_eq!(stored_day, date);
    assert_eq!(stored_payload, vec![0u8, 159, 146, 150]);
    assert!(stored_done);
    Ok(())
}

#[tokio::test]
async fn test_raw_sql_escape_hatch() {
    test_raw_sql_escape_hatch_impl().unwrap();
}

fn test_raw_sql_escape_hatch_impl() -> Result<()> {
    let conn = create_test_db()?;
    insert_user(&conn, "Ann", "ann@x.io", Some(30))?;
    let users = users_table();

    let upper_email: String = conn.scalar(
        users
            .select()
            .column(upper(users.column::<Text>("email")?.expr()))
            .filter(sql::<Bool>("\"age\" > 18")),
    )?;
    assert_eq!(upper_email, "ANN@X.IO");

    let n: i64 = conn.scalar(Statement::raw(
        "SELECT count(*) FROM users WHERE email LIKE ?",
        vec![Value::Text("%@x.io".into())],
    ))?;
    assert_eq!(n, 1);
    Ok(())
}

#[tokio::test]
async fn test_invalid_utf8_text_is_a_decode_error() {
    test_invalid_utf8_text_is_a_decode_error_impl().unwrap();
}

fn test_invalid_utf8_text_is_a_decode_error_impl() -> Result<()> {
    let conn = create_test_db()?;

    let err = conn
        .scalar::<String, _>(Statement::raw("SELECT CAST(X'FF61' AS TEXT)", Vec::new()))
        .unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::InvalidFormat(_))));

    let err = conn
        .fetch_all::<HashMap<String, Value>, _>(Statement::raw(
            "SELECT CAST(X'FF61' AS TEXT) AS t",
            Vec::new(),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::InvalidFormat(_))));

    let ok: String = conn.scalar(Statement::raw("SELECT CAST(X'6161' AS TEXT)", Vec::new()))?;
    assert_eq!(ok, "aa");
    Ok(())
}

#[tokio::test]
async fn test_text_primary_key_rejects_null() {
    test_text_primary_key_rejects_null_impl().unwrap();
}

fn test_text_primary_key_rejects_null_impl() -> Result<()> {
    let conn = create_test_db()?;
    let countries = TableDefinition::new("countries")
        .column(ColumnDefinition::new::<Text>("code").primary_key())
        .column(ColumnDefinition::new::<Nullable<Text>>("name"))
        .build()?;
    conn.execute(countries.create())?;

    let err = conn
        .execute(Statement::raw(
            "INSERT INTO countries (code, name) VALUES (NULL, 'Nowhere')",
            Vec::new(),
        ))
        .unwrap_err();
    assert!(err.is_constraint_violation());

    let code = countries.column::<Text>("code")?;
    conn.execute(countries.insert().values([code.to("NZ")]))?;
    assert_eq!(count_rows(&conn, &countries)?, 1);
    Ok(())
}
