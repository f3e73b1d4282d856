use crate::domain::a001_sync_queue_item::aggregate::SyncQueueItem;
use crate::domain::common::{
    AggregateId, AggregateRoot, BaseAggregate, EntityMetadata, EventStore, Origin,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::status::{SyncFeedMode, SyncFeedStatus};

/// ID типа для фида синхронизации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncFeedId(pub Uuid);

impl SyncFeedId {
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

impl AggregateId for SyncFeedId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }
    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(SyncFeedId::new)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

/// Фаза фида
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    Price,
    Quantity,
}

impl FeedPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedPhase::Price => "price",
            FeedPhase::Quantity => "quantity",
        }
    }
}

/// Исход обработки одной позиции фида
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOutcome {
    Success,
    Warning,
    Error,
}

/// Результат обработки одной позиции (ASIN) в одной фазе
///
/// Построчные результаты не меняют фазовый статус фида: фид может дойти до
/// `completed` с `error_count > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedLineResult {
    pub asin: String,
    pub phase: FeedPhase,
    pub outcome: LineOutcome,
    pub message: Option<String>,
}

/// Агрегированная заявка по одному ASIN
///
/// Производная структура: пересчитывается при каждом проходе агрегации и
/// снимком фиксируется в фиде на момент его создания. Поздние правки очереди
/// уже созданный фид не трогают.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub asin: String,
    /// Позиции очереди, вошедшие в заявку
    pub items: Vec<SyncQueueItem>,
    /// Суммарный остаток по всем позициям
    pub quantity: i32,
    /// Согласованная цена
    pub price: f64,
    pub has_price_conflict: bool,
}

/// Конфликт цен: две и более позиции делят ASIN, но расходятся в цене.
/// Блокирует ASIN от агрегации, пока пользователь не разрешит конфликт.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConflict {
    pub asin: String,
    /// Конфликтующие значения цены (по возрастанию, без дублей)
    pub prices: Vec<f64>,
    /// Позиции очереди, участвующие в конфликте
    pub item_ids: Vec<Uuid>,
}

/// Фид синхронизации Amazon — единица работы, отправляемая на Amazon
///
/// Создаётся при отправке очереди пользователем; мутируется только
/// оркестратором и поллером; никогда не удаляется — только переходит в
/// терминальный статус.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFeed {
    #[serde(flatten)]
    pub base: BaseAggregate<SyncFeedId>,

    pub mode: SyncFeedMode,
    pub is_dry_run: bool,
    pub status: SyncFeedStatus,

    /// Снимок агрегированных заявок на момент создания фида
    pub entries: Vec<AggregatedEntry>,

    /// Id документа обработки ценового фида на стороне Amazon
    pub price_feed_id: Option<String>,
    /// Id документа обработки фида остатков. Обязан оставаться None, пока
    /// статус не прошёл quantity_pending.
    pub quantity_feed_id: Option<String>,

    /// Счётчик попыток сверки живой цены
    pub poll_count: i32,
    /// Счётчик транзиентных ошибок внешних вызовов (для наблюдаемости)
    pub transient_error_count: i32,

    pub success_count: i32,
    pub warning_count: i32,
    pub error_count: i32,
    pub error_message: Option<String>,

    /// Построчные результаты обеих фаз
    pub line_results: Vec<FeedLineResult>,

    /// Dry-run: подмена живой цены по ASIN (для сценариев несовпадения)
    pub dry_run_price_overrides: HashMap<String, f64>,
    /// Dry-run: построчные ошибки по ASIN
    pub dry_run_line_errors: HashMap<String, String>,

    /// Когда воркеру пора опросить фид в следующий раз
    pub next_poll_at: Option<DateTime<Utc>>,
}

impl SyncFeed {
    pub fn new_for_insert(
        entries: Vec<AggregatedEntry>,
        mode: SyncFeedMode,
        is_dry_run: bool,
    ) -> Self {
        let id = SyncFeedId::new_v4();
        let code = format!("FEED-{}", &id.as_string()[..8]);
        let description = format!("Синхронизация Amazon: {} ASIN", entries.len());
        let base = BaseAggregate::new(id, code, description);
        Self {
            base,
            mode,
            is_dry_run,
            status: mode.initial_status(),
            entries,
            price_feed_id: None,
            quantity_feed_id: None,
            poll_count: 0,
            transient_error_count: 0,
            success_count: 0,
            warning_count: 0,
            error_count: 0,
            error_message: None,
            line_results: Vec::new(),
            dry_run_price_overrides: HashMap::new(),
            dry_run_line_errors: HashMap::new(),
            next_poll_at: Some(Utc::now()),
        }
    }

    pub fn to_string_id(&self) -> String {
        self.base.id.as_string()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("Фид без позиций не имеет смысла".into());
        }
        for entry in &self.entries {
            if entry.has_price_conflict {
                return Err(format!(
                    "ASIN {} с неразрешённым конфликтом цен не может войти в фид",
                    entry.asin
                ));
            }
            if entry.price <= 0.0 {
                return Err(format!("ASIN {}: цена должна быть положительной", entry.asin));
            }
            if entry.quantity <= 0 {
                return Err(format!(
                    "ASIN {}: остаток должен быть положительным",
                    entry.asin
                ));
            }
        }
        Ok(())
    }

    pub fn before_write(&mut self) {
        self.base.touch();
    }

    /// Желаемая цена по ASIN (из снимка заявок)
    pub fn desired_price_for(&self, asin: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.asin == asin).map(|e| e.price)
    }

    /// Применить переход, если таблица состояний его разрешает
    pub fn transition_to(&mut self, next: SyncFeedStatus) -> bool {
        if self.status.allows(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Записать построчные результаты и обновить свёртку счётчиков
    pub fn record_line_results(&mut self, results: Vec<FeedLineResult>) {
        for result in &results {
            match result.outcome {
                LineOutcome::Success => self.success_count += 1,
                LineOutcome::Warning => self.warning_count += 1,
                LineOutcome::Error => self.error_count += 1,
            }
        }
        self.line_results.extend(results);
    }

    /// ASIN-ы, чья ценовая строка завершилась ошибкой: их живую цену
    /// бессмысленно сверять — новая цена на листинг не легла.
    pub fn price_rejected_asins(&self) -> Vec<&str> {
        self.line_results
            .iter()
            .filter(|r| r.phase == FeedPhase::Price && r.outcome == LineOutcome::Error)
            .map(|r| r.asin.as_str())
            .collect()
    }
}

impl AggregateRoot for SyncFeed {
    type Id = SyncFeedId;

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
        "a002"
    }

    fn collection_name() -> &'static str {
        "sync_feed"
    }

    fn element_name() -> &'static str {
        "Фид синхронизации Amazon"
    }

    fn list_name() -> &'static str {
        "Фиды синхронизации Amazon"
    }

    fn origin() -> Origin {
        Origin::Self_
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(asin: &str, price: f64, quantity: i32) -> AggregatedEntry {
        AggregatedEntry {
            asin: asin.to_string(),
            items: vec![],
            quantity,
            price,
            has_price_conflict: false,
        }
    }

    #[test]
    fn new_feed_starts_in_mode_initial_status() {
        let feed = SyncFeed::new_for_insert(
            vec![entry("B01X", 19.99, 3)],
            SyncFeedMode::TwoPhase,
            true,
        );
        assert_eq!(feed.status, SyncFeedStatus::PricePending);
        assert!(feed.quantity_feed_id.is_none());

        let legacy = SyncFeed::new_for_insert(
            vec![entry("B01X", 19.99, 3)],
            SyncFeedMode::SinglePhase,
            true,
        );
        assert_eq!(legacy.status, SyncFeedStatus::Pending);
    }

    #[test]
    fn record_line_results_updates_tally() {
        let mut feed = SyncFeed::new_for_insert(
            vec![entry("B01X", 19.99, 1), entry("B02Y", 5.50, 2)],
            SyncFeedMode::TwoPhase,
            true,
        );
        feed.record_line_results(vec![
            FeedLineResult {
                asin: "B01X".into(),
                phase: FeedPhase::Price,
                outcome: LineOutcome::Success,
                message: None,
            },
            FeedLineResult {
                asin: "B02Y".into(),
                phase: FeedPhase::Price,
                outcome: LineOutcome::Error,
                message: Some("SKU suppressed".into()),
            },
        ]);
        assert_eq!(feed.success_count, 1);
        assert_eq!(feed.error_count, 1);
        assert_eq!(feed.warning_count, 0);
        assert_eq!(feed.price_rejected_asins(), vec!["B02Y"]);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut feed = SyncFeed::new_for_insert(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::TwoPhase,
            true,
        );
        assert!(!feed.transition_to(SyncFeedStatus::QuantitySubmitted));
        assert_eq!(feed.status, SyncFeedStatus::PricePending);
        assert!(feed.transition_to(SyncFeedStatus::PriceSubmitted));
        assert_eq!(feed.status, SyncFeedStatus::PriceSubmitted);
    }

    #[test]
    fn validate_rejects_conflicted_entries() {
        let mut conflicted = entry("B01X", 19.99, 1);
        conflicted.has_price_conflict = true;
        let feed =
            SyncFeed::new_for_insert(vec![conflicted], SyncFeedMode::TwoPhase, false);
        assert!(feed.validate().is_err());
    }
}
