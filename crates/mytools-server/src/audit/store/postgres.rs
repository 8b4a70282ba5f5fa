//! Postgres audit store over the `api_logs` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::AuditRecordStore;
use crate::audit::error::{AuditError, AuditResult};
use crate::audit::models::{AuditQuery, AuditRecord, NewAuditRecord};

const SELECT_COLUMNS: &str = r#"
    SELECT id, method, endpoint, query_params, request_body, response_body,
           status_code, duration_ms, client_ip, username, category, timestamp,
           error_message, stack_trace
    FROM api_logs
"#;

/// Row as stored; the category is free text until validated
#[derive(Debug, sqlx::FromRow)]
struct ApiLogRow {
    id: Uuid,
    method: String,
    endpoint: String,
    query_params: Option<String>,
    request_body: Option<String>,
    response_body: Option<String>,
    status_code: Option<i32>,
    duration_ms: Option<i64>,
    client_ip: Option<String>,
    username: String,
    category: String,
    timestamp: DateTime<Utc>,
    error_message: Option<String>,
    stack_trace: Option<String>,
}

impl TryFrom<ApiLogRow> for AuditRecord {
    type Error = AuditError;

    fn try_from(row: ApiLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            category: row.category.parse()?,
            id: row.id,
            method: row.method,
            endpoint: row.endpoint,
            query_params: row.query_params,
            request_body: row.request_body,
            response_body: row.response_body,
            status_code: row.status_code,
            duration_ms: row.duration_ms,
            client_ip: row.client_ip,
            username: row.username,
            timestamp: row.timestamp,
            error_message: row.error_message,
            stack_trace: row.stack_trace,
        })
    }
}

/// Audit store writing to Postgres through a shared pool
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRecordStore for PgAuditStore {
    async fn create(&self, record: NewAuditRecord) -> AuditResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO api_logs (
                method, endpoint, query_params, client_ip,
                username, category, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&record.method)
        .bind(&record.endpoint)
        .bind(&record.query_params)
        .bind(&record.client_ip)
        .bind(&record.username)
        .bind(record.category.as_str())
        .bind(record.timestamp)
        .fetch_one(&self.pool)
        .await?;

        debug!(audit_id = %id, endpoint = %record.endpoint, "Created api log row");

        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> AuditResult<Option<AuditRecord>> {
        let sql = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, ApiLogRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AuditRecord::try_from).transpose()
    }

    async fn update(&self, record: &AuditRecord) -> AuditResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE api_logs
            SET status_code = $2,
                duration_ms = $3,
                request_body = $4,
                response_body = $5,
                error_message = $6,
                stack_trace = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status_code)
        .bind(record.duration_ms)
        .bind(&record.request_body)
        .bind(&record.response_body)
        .bind(&record.error_message)
        .bind(&record.stack_trace)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuditError::NotFound(record.id));
        }

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        let mut sql = format!("{} WHERE 1=1", SELECT_COLUMNS);

        let mut bind_count = 1;
        let mut conditions = Vec::new();

        if query.method.is_some() {
            conditions.push(format!("UPPER(method) = UPPER(${})", bind_count));
            bind_count += 1;
        }
        if query.endpoint.is_some() {
            conditions.push(format!("endpoint = ${}", bind_count));
            bind_count += 1;
        }
        if query.category.is_some() {
            conditions.push(format!("category = ${}", bind_count));
            bind_count += 1;
        }
        if query.status_code.is_some() {
            conditions.push(format!("status_code = ${}", bind_count));
            bind_count += 1;
        }
        if query.start_time.is_some() {
            conditions.push(format!("timestamp >= ${}", bind_count));
            bind_count += 1;
        }
        if query.end_time.is_some() {
            conditions.push(format!("timestamp <= ${}", bind_count));
            bind_count += 1;
        }

        for condition in conditions {
            sql.push_str(" AND ");
            sql.push_str(&condition);
        }

        sql.push_str(" ORDER BY timestamp DESC");
        sql.push_str(&format!(" LIMIT ${}", bind_count));
        bind_count += 1;
        sql.push_str(&format!(" OFFSET ${}", bind_count));

        let mut query_builder = sqlx::query_as::<_, ApiLogRow>(&sql);

        // Bind parameters in the order the conditions were added
        if let Some(method) = &query.method {
            query_builder = query_builder.bind(method);
        }
        if let Some(endpoint) = &query.endpoint {
            query_builder = query_builder.bind(endpoint);
        }
        if let Some(category) = query.category {
            query_builder = query_builder.bind(category.as_str());
        }
        if let Some(status_code) = query.status_code {
            query_builder = query_builder.bind(status_code);
        }
        if let Some(start_time) = query.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = query.end_time {
            query_builder = query_builder.bind(end_time);
        }

        query_builder = query_builder
            .bind(query.effective_limit())
            .bind(query.effective_offset());

        let rows = query_builder.fetch_all(&self.pool).await?;

        debug!(count = rows.len(), "Queried api logs");

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
