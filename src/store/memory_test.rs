//! Tests for the in-memory document backend.

use std::collections::BTreeMap;

use futures_util::FutureExt;

use crate::error::DbError;
use crate::query::{Filter, QueryOptions, SortOrder};
use crate::record::Record;
use crate::schema::{Attributes, ColumnDef, ColumnType, ModelDef};
use crate::store::{Database, MemoryDatabase};
use crate::value::FieldValue;

fn article_model() -> ModelDef {
    ModelDef::new(
        "article",
        "articles",
        "main",
        Attributes::new()
            .with("title", ColumnDef::new(ColumnType::Text))
            .with("views", ColumnDef::new(ColumnType::Integer)),
    )
}

fn article(id: &str, title: &str, views: i64) -> Record {
    let mut record = Record::new();
    record
        .set("id", id)
        .set("title", title)
        .set("views", views);
    record
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_and_find_one() {
    let db = MemoryDatabase::new();
    let model = article_model();

    db.insert(&model, &article("a1", "First", 10)).await.unwrap();

    let found = db
        .find_one(&model, &QueryOptions::new().filter(Filter::eq("id", "a1")))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(found.get("title"), Some(&FieldValue::Text("First".into())));
    assert!(!found.is_new());
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_insert_is_rejected() {
    let db = MemoryDatabase::new();
    let model = article_model();

    db.insert(&model, &article("a1", "First", 0)).await.unwrap();
    let err = db.insert(&model, &article("a1", "Again", 0)).await.unwrap_err();
    assert!(matches!(err, DbError::AlreadyExists { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_merges_changes() {
    let db = MemoryDatabase::new();
    let model = article_model();
    db.insert(&model, &article("a1", "First", 10)).await.unwrap();

    let mut changes = BTreeMap::new();
    changes.insert("title".to_string(), FieldValue::Text("Renamed".into()));
    let affected = db
        .update(&model, &FieldValue::Text("a1".into()), &changes)
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let found = db
        .find_one(&model, &QueryOptions::new().filter(Filter::eq("id", "a1")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("title"), Some(&FieldValue::Text("Renamed".into())));
    assert_eq!(found.get("views"), Some(&FieldValue::Int(10)));

    let affected = db
        .update(&model, &FieldValue::Text("missing".into()), &changes)
        .await
        .unwrap();
    assert_eq!(affected, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn find_all_filters_sorts_and_paginates() {
    let db = MemoryDatabase::new();
    let model = article_model();
    for (id, title, views) in [("a1", "A", 5), ("a2", "B", 15), ("a3", "C", 25)] {
        db.insert(&model, &article(id, title, views)).await.unwrap();
    }

    let options = QueryOptions::new()
        .filter(Filter::Gt("views".into(), FieldValue::Int(4)))
        .sort("views", SortOrder::Desc)
        .limit(2);
    let records = db.find_all(&model, &options).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("views"), Some(&FieldValue::Int(25)));
    assert_eq!(records[1].get("views"), Some(&FieldValue::Int(15)));

    let second_page = db
        .find_all(&model, &options.clone().page(2))
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].get("views"), Some(&FieldValue::Int(5)));
}

#[tokio::test(flavor = "multi_thread")]
async fn count_ignores_pagination() {
    let db = MemoryDatabase::new();
    let model = article_model();
    for (id, views) in [("a1", 1), ("a2", 2), ("a3", 3)] {
        db.insert(&model, &article(id, "t", views)).await.unwrap();
    }

    let options = QueryOptions::new()
        .filter(Filter::Gt("views".into(), FieldValue::Int(1)))
        .limit(1);
    assert_eq!(db.count(&model, &options).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_where_touches_matching_rows_only() {
    let db = MemoryDatabase::new();
    let model = article_model();
    for (id, views) in [("a1", 1), ("a2", 2), ("a3", 3)] {
        db.insert(&model, &article(id, "t", views)).await.unwrap();
    }

    let mut changes = BTreeMap::new();
    changes.insert("title".to_string(), FieldValue::Text("bulk".into()));
    let affected = db
        .update_where(
            &model,
            &changes,
            Some(&Filter::Gte("views".into(), FieldValue::Int(2))),
        )
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let untouched = db
        .find_one(&model, &QueryOptions::new().filter(Filter::eq("id", "a1")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.get("title"), Some(&FieldValue::Text("t".into())));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_a_row() {
    let db = MemoryDatabase::new();
    let model = article_model();
    db.insert(&model, &article("a1", "t", 0)).await.unwrap();

    assert_eq!(
        db.delete(&model, &FieldValue::Text("a1".into())).await.unwrap(),
        1
    );
    assert_eq!(
        db.delete(&model, &FieldValue::Text("a1".into())).await.unwrap(),
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_transaction_restores_the_store() {
    let db = MemoryDatabase::new();
    let model = article_model();
    db.insert(&model, &article("a1", "kept", 0)).await.unwrap();

    let committed = db
        .run_transaction(|db: &MemoryDatabase| {
            async move {
                let model = article_model();
                db.insert(&model, &article("a2", "lost", 0)).await?;
                Err(DbError::database("boom"))
            }
            .boxed()
        })
        .await
        .unwrap();
    assert!(!committed);

    let model = article_model();
    assert_eq!(db.count(&model, &QueryOptions::new()).await.unwrap(), 1);

    let committed = db
        .run_transaction(|db: &MemoryDatabase| {
            async move {
                let model = article_model();
                db.insert(&model, &article("a3", "kept too", 0)).await
            }
            .boxed()
        })
        .await
        .unwrap();
    assert!(committed);
    assert_eq!(db.count(&model, &QueryOptions::new()).await.unwrap(), 2);
}
