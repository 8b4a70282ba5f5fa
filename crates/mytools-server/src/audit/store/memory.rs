use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AuditRecordStore;
use crate::audit::error::{AuditError, AuditResult};
use crate::audit::models::{AuditQuery, AuditRecord, NewAuditRecord};

/// Audit store backed by a map in process memory
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<HashMap<Uuid, AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every stored record, newest first
    pub async fn all(&self) -> Vec<AuditRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }
}

#[async_trait]
impl AuditRecordStore for InMemoryAuditStore {
    async fn create(&self, record: NewAuditRecord) -> AuditResult<Uuid> {
        let id = Uuid::new_v4();
        self.records.write().await.insert(id, record.into_record(id));
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> AuditResult<Option<AuditRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            },
            None => Err(AuditError::NotFound(record.id)),
        }
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        let offset = usize::try_from(query.effective_offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.effective_limit()).unwrap_or(usize::MAX);

        Ok(self
            .all()
            .await
            .into_iter()
            .filter(|record| query.matches(record))
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::Category;
    use chrono::{Duration, Utc};

    fn new_record(endpoint: &str, category: Category, age_secs: i64) -> NewAuditRecord {
        NewAuditRecord {
            method: "GET".to_string(),
            endpoint: endpoint.to_string(),
            query_params: None,
            client_ip: None,
            username: "anonymous".to_string(),
            category,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn test_create_find_update() {
        let store = InMemoryAuditStore::new();
        let id = store
            .create(new_record("/api/products", Category::BusinessApi, 0))
            .await
            .unwrap();

        let mut record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert!(!record.is_completed());

        record.complete(201, 12);
        store.update(&record).await.unwrap();

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status_code, Some(201));
        assert_eq!(stored.duration_ms, Some(12));
    }

    #[tokio::test]
    async fn test_find_unknown_id() {
        let store = InMemoryAuditStore::new();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = InMemoryAuditStore::new();
        let record = new_record("/api/products", Category::BusinessApi, 0).into_record(Uuid::new_v4());

        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(err, AuditError::NotFound(id) if id == record.id));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_newest_first() {
        let store = InMemoryAuditStore::new();
        store.create(new_record("/api/products", Category::BusinessApi, 30)).await.unwrap();
        store.create(new_record("/actuator/health", Category::Infra, 20)).await.unwrap();
        store.create(new_record("/api/products", Category::BusinessApi, 10)).await.unwrap();

        let all = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let business = store
            .query(&AuditQuery {
                category: Some(Category::BusinessApi),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(business.len(), 2);

        let paged = store
            .query(&AuditQuery {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].endpoint, "/actuator/health");
    }
}
