/// SQLite-backed document store
use crate::{
    error::{VodSyncError, VodSyncResult},
    metrics,
    store::{strip_id, with_id, DocumentStore, Filter, ID_FIELD},
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::time::Instant;
use uuid::Uuid;

/// Stores each document as a JSON body in the `documents` table
///
/// Non-identity filters are evaluated with `json_extract`. Lookups on
/// `code`, `name` and `user` hit the expression indexes created by the
/// migrations.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Locate the first matching document, returning `(id, body)`
    async fn find_row(
        &self,
        collection: &str,
        filter: Filter<'_>,
    ) -> VodSyncResult<Option<(String, String)>> {
        let started = Instant::now();

        let row = if filter.field == ID_FIELD {
            sqlx::query(
                r#"
                SELECT id, body
                FROM documents
                WHERE collection = ?1 AND id = ?2
                "#,
            )
            .bind(collection)
            .bind(filter.value)
            .fetch_optional(&self.db)
            .await?
        } else if let Some(expr) = indexed_expr(filter.field) {
            let sql = select_by_field(expr, "?2");
            sqlx::query(&sql)
                .bind(collection)
                .bind(filter.value)
                .fetch_optional(&self.db)
                .await?
        } else {
            let sql = select_by_field("json_extract(body, ?2)", "?3");
            sqlx::query(&sql)
                .bind(collection)
                .bind(json_path(filter.field))
                .bind(filter.value)
                .fetch_optional(&self.db)
                .await?
        };

        metrics::record_db_query("SELECT", collection, started.elapsed().as_secs_f64());

        match row {
            Some(row) => Ok(Some((row.try_get("id")?, row.try_get("body")?))),
            None => Ok(None),
        }
    }
}

/// Indexed body fields, spelled exactly as in the migrations
///
/// SQLite only uses an expression index for a literally identical
/// expression; a bound JSON path never matches.
fn indexed_expr(field: &str) -> Option<&'static str> {
    match field {
        "code" => Some("json_extract(body, '$.code')"),
        "name" => Some("json_extract(body, '$.name')"),
        "user" => Some("json_extract(body, '$.user')"),
        _ => None,
    }
}

/// First document in `?1` whose `expr` equals `value_param`
fn select_by_field(expr: &str, value_param: &str) -> String {
    format!(
        r#"
        SELECT id, body
        FROM documents
        WHERE collection = ?1 AND {expr} = {value_param}
        ORDER BY created_at, rowid
        LIMIT 1
        "#
    )
}

/// JSON path for a top-level field, quoted so any key is addressable
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn encode_body(doc: Value) -> VodSyncResult<String> {
    if !doc.is_object() {
        return Err(VodSyncError::Validation(
            "Documents must be JSON objects".to_string(),
        ));
    }
    Ok(serde_json::to_string(&strip_id(doc))?)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find_one(&self, collection: &str, filter: Filter<'_>) -> VodSyncResult<Option<Value>> {
        match self.find_row(collection, filter).await? {
            Some((id, body)) => {
                let doc: Value = serde_json::from_str(&body)?;
                Ok(Some(with_id(doc, &id)))
            }
            None => Ok(None),
        }
    }

    async fn insert_one(&self, collection: &str, doc: Value) -> VodSyncResult<String> {
        let body = encode_body(doc)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let started = Instant::now();

        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(&id)
        .bind(collection)
        .bind(&body)
        .bind(&now)
        .execute(&self.db)
        .await?;

        metrics::record_db_query("INSERT", collection, started.elapsed().as_secs_f64());
        tracing::debug!(collection, id = %id, "inserted document");

        Ok(id)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Filter<'_>,
        doc: Value,
        upsert: bool,
    ) -> VodSyncResult<bool> {
        let Some((id, _)) = self.find_row(collection, filter).await? else {
            if upsert {
                self.insert_one(collection, doc).await?;
                return Ok(true);
            }
            return Ok(false);
        };

        let body = encode_body(doc)?;
        let started = Instant::now();

        // Last writer wins; there is no version check on replace
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&self.db)
        .await?;

        metrics::record_db_query("UPDATE", collection, started.elapsed().as_secs_f64());

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    async fn create_test_store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(db::memory_pool().await)
    }

    #[tokio::test]
    async fn test_insert_and_find_by_field() {
        let store = create_test_store().await;

        let id = store
            .insert_one("reports", json!({"code": "ABC123", "title": "Savage"}))
            .await
            .unwrap();

        let found = store
            .find_one("reports", Filter::eq("code", "ABC123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["_id"], id.as_str());
        assert_eq!(found["title"], "Savage");

        // Collections are isolated
        let other = store
            .find_one("metadata", Filter::eq("code", "ABC123"))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_replace_keeps_identity() {
        let store = create_test_store().await;

        let id = store
            .insert_one("reports", json!({"code": "ABC123", "title": "old"}))
            .await
            .unwrap();

        // A foreign _id in the body must not change the stored identity
        let replaced = store
            .replace_one(
                "reports",
                Filter::by_id(&id),
                json!({"_id": "bogus", "code": "ABC123", "title": "new"}),
                false,
            )
            .await
            .unwrap();
        assert!(replaced);

        let found = store
            .find_one("reports", Filter::by_id(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["title"], "new");
        assert_eq!(found["_id"], id.as_str());
    }

    #[tokio::test]
    async fn test_replace_without_upsert_misses() {
        let store = create_test_store().await;

        let replaced = store
            .replace_one("auths", Filter::eq("user", "a@b.c"), json!({"user": "a@b.c"}), false)
            .await
            .unwrap();
        assert!(!replaced);

        let upserted = store
            .replace_one("auths", Filter::eq("user", "a@b.c"), json!({"user": "a@b.c"}), true)
            .await
            .unwrap();
        assert!(upserted);
        assert!(store
            .find_one("auths", Filter::eq("user", "a@b.c"))
            .await
            .unwrap()
            .is_some());
    }

    async fn query_plan(store: &SqliteDocumentStore, field: &str) -> String {
        let expr = indexed_expr(field).unwrap();
        let sql = format!("EXPLAIN QUERY PLAN {}", select_by_field(expr, "?2"));
        let rows = sqlx::query(&sql)
            .bind("reports")
            .bind("ABC123")
            .fetch_all(&store.db)
            .await
            .unwrap();
        rows.iter()
            .map(|row| row.try_get::<String, _>("detail").unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_field_lookups_use_expression_indexes() {
        let store = create_test_store().await;

        let plan = query_plan(&store, "code").await;
        assert!(plan.contains("idx_documents_report_code"), "{}", plan);
        assert!(plan.contains("<expr>=?"), "{}", plan);

        let plan = query_plan(&store, "name").await;
        assert!(plan.contains("idx_documents_name"), "{}", plan);

        let plan = query_plan(&store, "user").await;
        assert!(plan.contains("idx_documents_user"), "{}", plan);
    }

    #[tokio::test]
    async fn test_find_by_unindexed_field() {
        let store = create_test_store().await;
        store
            .insert_one("reports", json!({"code": "ABC123", "title": "Savage"}))
            .await
            .unwrap();

        let found = store
            .find_one("reports", Filter::eq("title", "Savage"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["code"], "ABC123");
    }

    #[tokio::test]
    async fn test_rejects_non_object_documents() {
        let store = create_test_store().await;
        assert!(store.insert_one("reports", json!([1, 2, 3])).await.is_err());
    }
}
