//! Tests for ModelHandle lifecycle and query scoping.

use std::sync::Arc;

use crate::error::DbError;
use crate::model::ModelHandle;
use crate::query::{Filter, QueryOptions, SortOrder};
use crate::record::Record;
use crate::schema::{Attributes, ColumnDef, ColumnType, ModelDef};
use crate::store::{MemoryDatabase, SqliteDatabase};
use crate::value::FieldValue;

fn article_def() -> ModelDef {
    ModelDef::new(
        "article",
        "articles",
        "main",
        Attributes::new()
            .with("title", ColumnDef::new(ColumnType::Text).not_empty())
            .with("views", ColumnDef::new(ColumnType::Integer)),
    )
}

async fn sqlite_handle(def: ModelDef) -> ModelHandle<SqliteDatabase> {
    let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
    ModelHandle::bind(def, db).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn save_new_record_generates_id_and_stamps() {
    let handle = sqlite_handle(article_def()).await;

    let mut record = Record::new();
    record.set("title", "First post");
    handle.save(&mut record).await.unwrap();

    assert!(!record.is_new());
    assert!(!record.is_dirty());
    let id = record.id().expect("id should be generated");
    assert!(matches!(id, FieldValue::Text(s) if s.len() == 8));
    assert!(record.created_at().is_some());
    assert_eq!(record.created_at(), record.updated_at());
    assert_eq!(record.version(), Some(0));

    // Defaults from the attributes were applied.
    assert_eq!(record.get("views"), Some(&FieldValue::Int(0)));
}

#[tokio::test(flavor = "multi_thread")]
async fn save_existing_record_persists_changes_and_bumps_version() {
    let handle = sqlite_handle(article_def()).await;

    let mut record = Record::new();
    record.set("title", "First").set("views", 1);
    handle.save(&mut record).await.unwrap();
    let id = record.id().cloned().unwrap();

    record.set("title", "Renamed");
    handle.save(&mut record).await.unwrap();
    assert_eq!(record.version(), Some(1));

    let stored = handle.first_by_attr("id", id).await.unwrap().unwrap();
    assert_eq!(stored.get("title"), Some(&FieldValue::Text("Renamed".into())));
    assert_eq!(stored.version(), Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn saving_a_clean_record_is_a_noop() {
    let handle = sqlite_handle(article_def()).await;

    let mut record = Record::new();
    record.set("title", "First");
    handle.save(&mut record).await.unwrap();
    let updated_at = record.updated_at();
    let version = record.version();

    handle.save(&mut record).await.unwrap();
    assert_eq!(record.updated_at(), updated_at);
    assert_eq!(record.version(), version);
}

#[tokio::test(flavor = "multi_thread")]
async fn save_validates_against_attributes() {
    let handle = sqlite_handle(article_def()).await;

    // title is not_empty and has no usable default
    let mut record = Record::new();
    record.set("views", 1);
    let err = handle.save(&mut record).await.unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn updating_a_vanished_record_is_not_found() {
    let handle = sqlite_handle(article_def()).await;

    let mut record = Record::new();
    record.set("title", "First");
    handle.save(&mut record).await.unwrap();
    let id = record.id().cloned().unwrap();

    assert!(handle.destroy(&id).await.unwrap());

    record.set("title", "Ghost");
    let err = handle.save(&mut record).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn soft_delete_models_hide_deleted_records_by_default() {
    let db = Arc::new(MemoryDatabase::new());
    let def = article_def().with_soft_delete();
    let handle = ModelHandle::bind(def, db).await.unwrap();

    let mut live = Record::new();
    live.set("title", "live");
    handle.save(&mut live).await.unwrap();

    let mut gone = Record::new();
    gone.set("title", "gone");
    handle.save(&mut gone).await.unwrap();
    gone.mark_deleted(123);
    handle.save(&mut gone).await.unwrap();

    let visible = handle.get(&QueryOptions::new()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].get("title"), Some(&FieldValue::Text("live".into())));

    let all = handle
        .get(&QueryOptions::new().with_deleted())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert_eq!(handle.count(&QueryOptions::new()).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_sort_fields_are_dropped() {
    let handle = sqlite_handle(article_def()).await;

    let mut record = Record::new();
    record.set("title", "only");
    handle.save(&mut record).await.unwrap();

    // Would be a SQL error if the bogus field reached the backend.
    let records = handle
        .get(&QueryOptions::new().sort("no_such_column", SortOrder::Desc))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_page_reports_totals() {
    let handle = sqlite_handle(article_def()).await;

    for title in ["a", "b", "c", "d", "e"] {
        let mut record = Record::new();
        record.set("title", title);
        handle.save(&mut record).await.unwrap();
    }

    let page = handle
        .get_page(
            &QueryOptions::new()
                .sort("title", SortOrder::Asc)
                .limit(2)
                .page(2),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.page, 2);
    assert_eq!(page.limit, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].get("title"), Some(&FieldValue::Text("c".into())));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_by_attr_filters_exactly() {
    let handle = sqlite_handle(article_def()).await;

    for (title, views) in [("a", 1), ("b", 1), ("c", 2)] {
        let mut record = Record::new();
        record.set("title", title).set("views", views);
        handle.save(&mut record).await.unwrap();
    }

    let records = handle.get_by_attr("views", 1).await.unwrap();
    assert_eq!(records.len(), 2);

    let one = handle.first_by_attr("title", "c").await.unwrap().unwrap();
    assert_eq!(one.get("views"), Some(&FieldValue::Int(2)));

    let missing = handle.first_by_attr("title", "zzz").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn filter_on_unknown_field_is_rejected_by_sqlite() {
    let handle = sqlite_handle(article_def()).await;

    let err = handle
        .get(&QueryOptions::new().filter(Filter::eq("bogus", 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidData { .. }));
}
