use anyhow::Result;
use chrono::{DateTime, Utc};
use contracts::domain::a002_sync_feed::aggregate::{SyncFeed, SyncFeedId};
use contracts::domain::a002_sync_feed::status::{SyncFeedMode, SyncFeedStatus};
use contracts::domain::common::{BaseAggregate, EntityMetadata};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::data::db::get_connection;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a002_sync_feed")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub description: String,
    pub comment: Option<String>,
    pub mode: String,
    pub status: String,
    pub is_dry_run: bool,
    pub entries_json: String,
    pub line_results_json: String,
    pub price_feed_id: Option<String>,
    pub quantity_feed_id: Option<String>,
    pub poll_count: i32,
    pub transient_error_count: i32,
    pub success_count: i32,
    pub warning_count: i32,
    pub error_count: i32,
    pub error_message: Option<String>,
    pub dry_run_price_overrides_json: String,
    pub dry_run_line_errors_json: String,
    pub next_poll_at: Option<String>,
    pub is_deleted: bool,
    pub is_posted: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SyncFeed {
    fn from(m: Model) -> Self {
        let metadata = EntityMetadata {
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
            is_deleted: m.is_deleted,
            is_posted: m.is_posted,
            version: m.version,
        };
        let uuid = Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4());
        let next_poll_at = m
            .next_poll_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        SyncFeed {
            base: BaseAggregate::with_metadata(
                SyncFeedId(uuid),
                m.code,
                m.description,
                m.comment,
                metadata,
            ),
            mode: SyncFeedMode::from_str(&m.mode).unwrap_or_default(),
            is_dry_run: m.is_dry_run,
            status: SyncFeedStatus::from_str(&m.status).unwrap_or(SyncFeedStatus::Failed),
            entries: serde_json::from_str(&m.entries_json).unwrap_or_default(),
            price_feed_id: m.price_feed_id,
            quantity_feed_id: m.quantity_feed_id,
            poll_count: m.poll_count,
            transient_error_count: m.transient_error_count,
            success_count: m.success_count,
            warning_count: m.warning_count,
            error_count: m.error_count,
            error_message: m.error_message,
            line_results: serde_json::from_str(&m.line_results_json).unwrap_or_default(),
            dry_run_price_overrides: serde_json::from_str(&m.dry_run_price_overrides_json)
                .unwrap_or_default(),
            dry_run_line_errors: serde_json::from_str(&m.dry_run_line_errors_json)
                .unwrap_or_default(),
            next_poll_at,
        }
    }
}

fn to_active_model(feed: &SyncFeed, is_insert: bool) -> Result<ActiveModel> {
    let entries_json = serde_json::to_string(&feed.entries)?;
    let line_results_json = serde_json::to_string(&feed.line_results)?;
    let overrides_json = serde_json::to_string(&feed.dry_run_price_overrides)?;
    let line_errors_json = serde_json::to_string(&feed.dry_run_line_errors)?;

    Ok(ActiveModel {
        id: Set(feed.base.id.value().to_string()),
        code: Set(feed.base.code.clone()),
        description: Set(feed.base.description.clone()),
        comment: Set(feed.base.comment.clone()),
        mode: Set(feed.mode.as_str().to_string()),
        status: Set(feed.status.as_str().to_string()),
        is_dry_run: Set(feed.is_dry_run),
        entries_json: Set(entries_json),
        line_results_json: Set(line_results_json),
        price_feed_id: Set(feed.price_feed_id.clone()),
        quantity_feed_id: Set(feed.quantity_feed_id.clone()),
        poll_count: Set(feed.poll_count),
        transient_error_count: Set(feed.transient_error_count),
        success_count: Set(feed.success_count),
        warning_count: Set(feed.warning_count),
        error_count: Set(feed.error_count),
        error_message: Set(feed.error_message.clone()),
        dry_run_price_overrides_json: Set(overrides_json),
        dry_run_line_errors_json: Set(line_errors_json),
        next_poll_at: Set(feed.next_poll_at.map(|dt| dt.to_rfc3339())),
        is_deleted: Set(feed.base.metadata.is_deleted),
        is_posted: Set(feed.base.metadata.is_posted),
        created_at: if is_insert {
            Set(Some(Utc::now()))
        } else {
            sea_orm::ActiveValue::NotSet
        },
        updated_at: Set(Some(Utc::now())),
        version: Set(feed.base.metadata.version + 1),
    })
}

pub async fn insert(feed: &SyncFeed) -> Result<Uuid> {
    let db = get_connection();
    let uuid = feed.base.id.value();
    Entity::insert(to_active_model(feed, true)?).exec(db).await?;
    Ok(uuid)
}

pub async fn get_by_id(id: Uuid) -> Result<Option<SyncFeed>> {
    let db = get_connection();
    let model = Entity::find_by_id(id.to_string()).one(db).await?;
    Ok(model.map(|m| m.into()))
}

pub async fn list_all() -> Result<Vec<SyncFeed>> {
    let db = get_connection();
    let models = Entity::find()
        .order_by_desc(Column::CreatedAt)
        .all(db)
        .await?;
    Ok(models.into_iter().map(|m| m.into()).collect())
}

fn terminal_status_strings() -> Vec<&'static str> {
    [
        SyncFeedStatus::Completed,
        SyncFeedStatus::Verified,
        SyncFeedStatus::VerificationFailed,
        SyncFeedStatus::Failed,
        SyncFeedStatus::Cancelled,
    ]
    .iter()
    .map(|s| s.as_str())
    .collect()
}

/// Нетерминальные фиды, чьё время опроса наступило
pub async fn list_due(now: DateTime<Utc>) -> Result<Vec<SyncFeed>> {
    let db = get_connection();
    let models = Entity::find()
        .filter(Column::Status.is_not_in(terminal_status_strings()))
        .filter(Column::NextPollAt.is_not_null())
        .filter(Column::NextPollAt.lte(now.to_rfc3339()))
        .order_by_asc(Column::NextPollAt)
        .all(db)
        .await?;
    Ok(models.into_iter().map(|m| m.into()).collect())
}

/// Сохранить фид, только если его персистентный статус всё ещё `expected`.
///
/// Это оптимистичная защита каждой записи: конкурирующий опрос или отмена,
/// успевшие сменить статус, отбрасывают нашу запись целиком.
pub async fn save_if_status(feed: &SyncFeed, expected: SyncFeedStatus) -> Result<bool> {
    let db = get_connection();
    let active_model = to_active_model(feed, false)?;
    let update = Entity::update(active_model)
        .filter(Column::Status.eq(expected.as_str()))
        .exec(db)
        .await;
    match update {
        Ok(_) => Ok(true),
        Err(DbErr::RecordNotUpdated) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Атомарный compare-and-set по статусу: единственная конкурентно-чувствительная
/// точка машины состояний (price_verified -> quantity_pending) плюс отмена.
pub async fn compare_and_set_status(
    id: Uuid,
    expected: SyncFeedStatus,
    next: SyncFeedStatus,
) -> Result<bool> {
    let db = get_connection();
    let result = Entity::update_many()
        .col_expr(Column::Status, Expr::value(next.as_str()))
        .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(Column::Id.eq(id.to_string()))
        .filter(Column::Status.eq(expected.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}
