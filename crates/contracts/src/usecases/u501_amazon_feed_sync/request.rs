use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::a002_sync_feed::status::SyncFeedMode;

/// Запрос на создание фида из текущей очереди
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeedRequest {
    /// Превью-режим: вместо Amazon работает симулятор
    #[serde(default)]
    pub is_dry_run: bool,

    /// Режим отправки (по умолчанию двухфазный)
    #[serde(default)]
    pub mode: SyncFeedMode,

    /// Dry-run: подмена живой цены по ASIN — для проверки пути
    /// verification_failed без обращения к Amazon
    #[serde(default)]
    pub dry_run_price_overrides: HashMap<String, f64>,

    /// Dry-run: построчные ошибки по ASIN — для проверки частичных отказов
    #[serde(default)]
    pub dry_run_line_errors: HashMap<String, String>,
}

impl Default for CreateFeedRequest {
    fn default() -> Self {
        Self {
            is_dry_run: false,
            mode: SyncFeedMode::TwoPhase,
            dry_run_price_overrides: HashMap::new(),
            dry_run_line_errors: HashMap::new(),
        }
    }
}
