use crate::domain::common::{
    AggregateId, AggregateRoot, BaseAggregate, EntityMetadata, EventStore, Origin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ID типа для позиции очереди синхронизации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncQueueItemId(pub Uuid);

impl SyncQueueItemId {
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl AggregateId for SyncQueueItemId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }
    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(SyncQueueItemId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

/// Позиция очереди синхронизации Amazon
///
/// Создаётся, когда пользователь отмечает товар для синхронизации;
/// удаляется, когда позиция попала в отправленный фид.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    #[serde(flatten)]
    pub base: BaseAggregate<SyncQueueItemId>,

    /// Ссылка на товар склада
    pub inventory_item_id: Uuid,

    /// ASIN листинга на Amazon
    pub asin: String,

    /// Желаемая цена
    pub desired_price: f64,

    /// Желаемый остаток (обычно 1, суммируется при агрегации)
    pub desired_quantity: i32,

    /// Когда позиция добавлена в очередь
    pub added_at: DateTime<Utc>,
}

/// DTO для создания/редактирования позиции очереди
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItemDto {
    pub id: Option<String>,
    pub inventory_item_id: String,
    pub asin: String,
    pub desired_price: f64,
    pub desired_quantity: i32,
}

impl SyncQueueItem {
    pub fn new_for_insert(
        inventory_item_id: Uuid,
        asin: String,
        desired_price: f64,
        desired_quantity: i32,
    ) -> Self {
        let id = SyncQueueItemId::new_v4();
        let code = format!("SYNC-{}", &id.as_string()[..8]);
        let base = BaseAggregate::new(id, code, asin.clone());
        Self {
            base,
            inventory_item_id,
            asin,
            desired_price,
            desired_quantity,
            added_at: Utc::now(),
        }
    }

    pub fn to_string_id(&self) -> String {
        self.base.id.as_string()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.asin.trim().is_empty() {
            return Err("ASIN обязателен".into());
        }
        if self.desired_price <= 0.0 {
            return Err("Цена должна быть положительной".into());
        }
        if self.desired_quantity <= 0 {
            return Err("Количество должно быть положительным".into());
        }
        Ok(())
    }

    pub fn before_write(&mut self) {
        self.base.touch();
    }
}

impl AggregateRoot for SyncQueueItem {
    type Id = SyncQueueItemId;

    fn id(&self) -> Self::Id {
        self.base.id
    }

    fn code(&self) -> &str {
        &self.base.code
    }

    fn description(&self) -> &str {
        &self.base.description
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.base.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.base.metadata
    }

    fn events(&self) -> &EventStore {
        &self.base.events
    }

    fn events_mut(&mut self) -> &mut EventStore {
        &mut self.base.events
    }

    fn aggregate_index() -> &'static str {
        "a001"
    }

    fn collection_name() -> &'static str {
        "sync_queue_item"
    }

    fn element_name() -> &'static str {
        "Позиция очереди синхронизации"
    }

    fn list_name() -> &'static str {
        "Очередь синхронизации Amazon"
    }

    fn origin() -> Origin {
        Origin::Self_
    }
}
