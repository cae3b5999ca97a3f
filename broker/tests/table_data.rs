mod support;

use std::sync::atomic::Ordering;

use common::errors::AppError;
use common::models::table::Row;
use common::models::{Direction, TableDataRequest};
use support::Harness;

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn test_keyset_walk_forward() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let first = h
        .manager
        .get_table_data(&id, &TableDataRequest::first_page("users", 2))
        .await
        .unwrap();
    assert!(first.use_id_pagination);
    assert_eq!(first.primary_key.as_deref(), Some("id"));
    assert_eq!(ids(&first.rows), vec![1, 2]);
    assert_eq!(first.next_id, Some(2));
    assert!(first.has_next_page);
    assert_eq!(first.total, 4);
    assert_eq!(first.total_pages, 2);

    let request = TableDataRequest::first_page("users", 2).after(2, Direction::Next);
    let second = h.manager.get_table_data(&id, &request).await.unwrap();
    assert_eq!(ids(&second.rows), vec![3, 4]);
    assert_eq!(second.next_id, None);
    assert!(!second.has_next_page);
}

#[tokio::test]
async fn test_next_then_prev_round_trips() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let request = TableDataRequest::first_page("users", 2).after(1, Direction::Next);
    let forward = h.manager.get_table_data(&id, &request).await.unwrap();
    assert_eq!(ids(&forward.rows), vec![2, 3]);
    let cursor = forward.next_id.unwrap();

    let request = TableDataRequest::first_page("users", 2).after(cursor, Direction::Prev);
    let back = h.manager.get_table_data(&id, &request).await.unwrap();
    assert_eq!(ids(&back.rows), ids(&forward.rows));
    assert_eq!(back.direction, Some(Direction::Prev));
    // One more row precedes the page.
    assert_eq!(back.next_id, Some(1));
    assert!(back.has_next_page);
}

#[tokio::test]
async fn test_prev_reaches_the_start() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let request = TableDataRequest::first_page("users", 2).after(2, Direction::Prev);
    let page = h.manager.get_table_data(&id, &request).await.unwrap();
    assert_eq!(ids(&page.rows), vec![1, 2]);
    assert_eq!(page.next_id, None);
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_page_jump_resolves_cursor() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let mut request = TableDataRequest::first_page("users", 2);
    request.page = 2;
    let page = h.manager.get_table_data(&id, &request).await.unwrap();
    assert!(page.use_id_pagination);
    assert_eq!(page.page, 2);
    assert_eq!(ids(&page.rows), vec![3, 4]);

    assert_eq!(h.manager.get_page_id(&id, "users", 1, 2).await.unwrap(), None);
    assert_eq!(h.manager.get_page_id(&id, "users", 2, 2).await.unwrap(), Some(2));
    assert!(matches!(
        h.manager.get_page_id(&id, "users", 9, 2).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.manager.get_page_id(&id, "items", 2, 2).await,
        Err(AppError::PaginationUnsupported(_))
    ));
}

#[tokio::test]
async fn test_page_jump_past_end_falls_back_to_offset() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let mut request = TableDataRequest::first_page("users", 2);
    request.page = 5;
    let page = h.manager.get_table_data(&id, &request).await.unwrap();
    assert!(!page.use_id_pagination);
    assert!(page.rows.is_empty());
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_keyset_failure_falls_back_to_offset() {
    let h = Harness::new(false);
    let id = h.connect(false).await;
    h.db.fail_keyset.store(true, Ordering::SeqCst);

    let page = h
        .manager
        .get_table_data(&id, &TableDataRequest::first_page("users", 3))
        .await
        .unwrap();
    assert!(!page.use_id_pagination);
    assert!(page.primary_key.is_none());
    assert_eq!(ids(&page.rows), vec![1, 2, 3]);
    assert_eq!(page.total_pages, 2);
    assert!(page.has_next_page);
}

#[tokio::test]
async fn test_non_integer_key_uses_offset() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let mut request = TableDataRequest::first_page("items", 3);
    request.page = 2;
    let page = h.manager.get_table_data(&id, &request).await.unwrap();
    assert!(!page.use_id_pagination);
    assert_eq!(ids(&page.rows), vec![4]);
    assert!(!page.has_next_page);
}

#[tokio::test]
async fn test_invalid_page_request() {
    let h = Harness::new(false);
    let id = h.connect(false).await;
    let mut request = TableDataRequest::first_page("users", 0);
    assert!(matches!(
        h.manager.get_table_data(&id, &request).await,
        Err(AppError::Validation(_))
    ));
    request.page_size = 2;
    request.page = 0;
    assert!(matches!(
        h.manager.get_table_data(&id, &request).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_execute_dispatches_by_query_type() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    let result = h.manager.execute(&id, "SELECT * FROM users LIMIT 1").await.unwrap();
    assert_eq!(result.row_count, 1);
    assert!(result.affected_rows.is_none());

    let result = h.manager.execute(&id, "update users set name = 'x'").await.unwrap();
    assert_eq!(result.affected_rows, Some(2));
    let result = h.manager.execute(&id, "DELETE FROM users WHERE id = 1").await.unwrap();
    assert_eq!(result.affected_rows, Some(3));
    let result = h.manager.execute(&id, "  INSERT INTO users VALUES (5, 'e')").await.unwrap();
    assert_eq!(result.affected_rows, Some(1));

    assert_eq!(h.db.statements.lock().len(), 4);
}

#[tokio::test]
async fn test_execute_rejections_never_reach_backend() {
    let h = Harness::new(false);
    let id = h.connect(false).await;

    assert!(matches!(
        h.manager.execute(&id, "SELECT * FROM users").await,
        Err(AppError::ValidationFailed { validator, .. }) if validator == "require_limit"
    ));
    assert!(matches!(
        h.manager.execute(&id, "SHOW TABLES").await,
        Err(AppError::UnsupportedQueryType(_))
    ));
    assert!(h.db.statements.lock().is_empty());

    h.manager.validators().remove("require_limit");
    assert!(h.manager.execute(&id, "SELECT * FROM users").await.is_ok());
}

#[tokio::test]
async fn test_backend_errors_are_tagged_with_verb() {
    let h = Harness::new(false);
    let id = h.connect(false).await;
    let err = h
        .manager
        .execute(&id, "SELECT * FROM missing_table LIMIT 1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QueryExecutionFailed { verb, .. } if verb == "query"));
}

#[tokio::test]
async fn test_metadata_passthrough() {
    let h = Harness::new(false);
    let id = h.connect(false).await;
    assert_eq!(h.manager.get_databases(&id).await.unwrap(), vec!["shop", "billing"]);
    assert_eq!(h.manager.get_tables(&id).await.unwrap(), vec!["items", "users"]);
    assert!(h.manager.get_table_schema(&id, "users").await.unwrap().starts_with("CREATE TABLE users"));
    assert_eq!(h.manager.get_table_columns(&id, "users").await.unwrap().len(), 2);
}
