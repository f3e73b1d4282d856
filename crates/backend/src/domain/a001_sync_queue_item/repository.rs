use anyhow::Result;
use chrono::Utc;
use contracts::domain::a001_sync_queue_item::aggregate::{SyncQueueItem, SyncQueueItemId};
use contracts::domain::common::{BaseAggregate, EntityMetadata};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::data::db::get_connection;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a001_sync_queue_item")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub description: String,
    pub comment: Option<String>,
    pub inventory_item_id: String,
    pub asin: String,
    pub desired_price: f64,
    pub desired_quantity: i32,
    pub added_at: String,
    pub is_deleted: bool,
    pub is_posted: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SyncQueueItem {
    fn from(m: Model) -> Self {
        let metadata = EntityMetadata {
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
            is_deleted: m.is_deleted,
            is_posted: m.is_posted,
            version: m.version,
        };
        let uuid = Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4());
        let inventory_item_id =
            Uuid::parse_str(&m.inventory_item_id).unwrap_or_else(|_| Uuid::nil());
        let added_at = chrono::DateTime::parse_from_rfc3339(&m.added_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| metadata.created_at);

        SyncQueueItem {
            base: BaseAggregate::with_metadata(
                SyncQueueItemId(uuid),
                m.code,
                m.description,
                m.comment,
                metadata,
            ),
            inventory_item_id,
            asin: m.asin,
            desired_price: m.desired_price,
            desired_quantity: m.desired_quantity,
            added_at,
        }
    }
}

fn to_active_model(item: &SyncQueueItem, is_insert: bool) -> ActiveModel {
    ActiveModel {
        id: Set(item.base.id.value().to_string()),
        code: Set(item.base.code.clone()),
        description: Set(item.base.description.clone()),
        comment: Set(item.base.comment.clone()),
        inventory_item_id: Set(item.inventory_item_id.to_string()),
        asin: Set(item.asin.clone()),
        desired_price: Set(item.desired_price),
        desired_quantity: Set(item.desired_quantity),
        added_at: Set(item.added_at.to_rfc3339()),
        is_deleted: Set(item.base.metadata.is_deleted),
        is_posted: Set(item.base.metadata.is_posted),
        created_at: if is_insert {
            Set(Some(Utc::now()))
        } else {
            sea_orm::ActiveValue::NotSet
        },
        updated_at: Set(Some(Utc::now())),
        version: Set(item.base.metadata.version + 1),
    }
}

pub async fn insert(item: &SyncQueueItem) -> Result<Uuid> {
    let db = get_connection();
    let uuid = item.base.id.value();
    Entity::insert(to_active_model(item, true)).exec(db).await?;
    Ok(uuid)
}

pub async fn get_by_id(id: Uuid) -> Result<Option<SyncQueueItem>> {
    let db = get_connection();
    let model = Entity::find_by_id(id.to_string()).one(db).await?;
    Ok(model.filter(|m| !m.is_deleted).map(|m| m.into()))
}

/// Живой снимок очереди, в порядке добавления
pub async fn list_active() -> Result<Vec<SyncQueueItem>> {
    let db = get_connection();
    let models = Entity::find()
        .filter(Column::IsDeleted.eq(false))
        .order_by_asc(Column::AddedAt)
        .all(db)
        .await?;
    Ok(models.into_iter().map(|m| m.into()).collect())
}

pub async fn soft_delete(id: Uuid) -> Result<bool> {
    let db = get_connection();
    let existing = Entity::find_by_id(id.to_string()).one(db).await?;
    if let Some(model) = existing {
        let mut active_model: ActiveModel = model.into();
        active_model.is_deleted = Set(true);
        active_model.updated_at = Set(Some(Utc::now()));
        Entity::update(active_model).exec(db).await?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Убрать из очереди позиции, вошедшие в отправленный фид
pub async fn soft_delete_many(ids: &[Uuid]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let db = get_connection();
    let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let result = Entity::update_many()
        .col_expr(Column::IsDeleted, Expr::value(true))
        .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(Column::Id.is_in(id_strings))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
