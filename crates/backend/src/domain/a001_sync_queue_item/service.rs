use super::repository;
use anyhow::Result;
use contracts::domain::a001_sync_queue_item::aggregate::{SyncQueueItem, SyncQueueItemDto};
use uuid::Uuid;

/// Добавить позицию в очередь синхронизации
pub async fn create(dto: SyncQueueItemDto) -> Result<Uuid> {
    let inventory_item_id = Uuid::parse_str(&dto.inventory_item_id)
        .map_err(|_| anyhow::anyhow!("Invalid inventory_item_id"))?;
    let mut item = SyncQueueItem::new_for_insert(
        inventory_item_id,
        dto.asin,
        dto.desired_price,
        dto.desired_quantity,
    );
    item.validate().map_err(|e| anyhow::anyhow!(e))?;
    item.before_write();
    let id = repository::insert(&item).await?;
    Ok(id)
}

pub async fn get_by_id(id: Uuid) -> Result<Option<SyncQueueItem>> {
    repository::get_by_id(id).await
}

pub async fn list_all() -> Result<Vec<SyncQueueItem>> {
    repository::list_active().await
}

pub async fn delete(id: Uuid) -> Result<bool> {
    repository::soft_delete(id).await
}

/// Убрать позиции, вошедшие в отправленный фид
pub async fn remove_included(ids: &[Uuid]) -> Result<u64> {
    let removed = repository::soft_delete_many(ids).await?;
    tracing::info!("Removed {} queue items included in a feed", removed);
    Ok(removed)
}

pub async fn insert_test_data() -> Result<()> {
    for (asin, price, quantity) in [
        ("B01N5IB20Q", 19.99, 1),
        ("B01N5IB20Q", 19.99, 2),
        ("B07FZ8S74R", 54.50, 1),
    ] {
        let dto = SyncQueueItemDto {
            id: None,
            inventory_item_id: Uuid::new_v4().to_string(),
            asin: asin.to_string(),
            desired_price: price,
            desired_quantity: quantity,
        };
        create(dto).await?;
    }
    Ok(())
}
