use serde::{Deserialize, Serialize};

/// Режим отправки фида
///
/// Двухфазный режим отправляет цены и остатки отдельными фидами: остаток не
/// уходит на Amazon, пока новая цена не подтверждена на листинге. Однофазный
/// (legacy) режим шлёт цену и остаток одной посылкой — для мелких фидов, где
/// риск короткого окна со старой ценой принят осознанно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncFeedMode {
    #[default]
    TwoPhase,
    SinglePhase,
}

impl SyncFeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFeedMode::TwoPhase => "two_phase",
            SyncFeedMode::SinglePhase => "single_phase",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "two_phase" => Some(SyncFeedMode::TwoPhase),
            "single_phase" => Some(SyncFeedMode::SinglePhase),
            _ => None,
        }
    }

    /// Начальный статус фида для режима
    pub fn initial_status(&self) -> SyncFeedStatus {
        match self {
            SyncFeedMode::TwoPhase => SyncFeedStatus::PricePending,
            SyncFeedMode::SinglePhase => SyncFeedStatus::Pending,
        }
    }
}

/// Статус фида синхронизации (машина состояний)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFeedStatus {
    // --- Двухфазный режим: сначала цены, потом остатки ---
    /// Фид создан, ценовая посылка ещё не отправлена
    PricePending,
    /// Ценовой фид принят Amazon, id документа обработки сохранён
    PriceSubmitted,
    /// Amazon ещё обрабатывает ценовой фид
    PriceProcessing,
    /// Обработка закончена, живая цена ещё не подтверждена
    PriceVerifying,
    /// Живая цена совпала с желаемой по всем позициям
    PriceVerified,
    /// Цена подтверждена, посылка с остатками ещё не отправлена
    QuantityPending,
    /// Фид остатков принят Amazon
    QuantitySubmitted,
    /// Amazon обрабатывает фид остатков
    QuantityProcessing,
    /// Обе фазы завершены
    Completed,

    // --- Однофазный (legacy) режим ---
    Pending,
    Submitted,
    Processing,
    Done,
    DoneVerifying,
    Verified,

    // --- Отказные статусы (оба режима) ---
    /// Живая цена не подтвердилась за отведённый бюджет попыток
    VerificationFailed,
    /// Невосстановимая ошибка (кривая посылка, авторизация, фатальный ответ Amazon)
    Failed,
    /// Отменён пользователем
    Cancelled,
}

impl SyncFeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFeedStatus::PricePending => "price_pending",
            SyncFeedStatus::PriceSubmitted => "price_submitted",
            SyncFeedStatus::PriceProcessing => "price_processing",
            SyncFeedStatus::PriceVerifying => "price_verifying",
            SyncFeedStatus::PriceVerified => "price_verified",
            SyncFeedStatus::QuantityPending => "quantity_pending",
            SyncFeedStatus::QuantitySubmitted => "quantity_submitted",
            SyncFeedStatus::QuantityProcessing => "quantity_processing",
            SyncFeedStatus::Completed => "completed",
            SyncFeedStatus::Pending => "pending",
            SyncFeedStatus::Submitted => "submitted",
            SyncFeedStatus::Processing => "processing",
            SyncFeedStatus::Done => "done",
            SyncFeedStatus::DoneVerifying => "done_verifying",
            SyncFeedStatus::Verified => "verified",
            SyncFeedStatus::VerificationFailed => "verification_failed",
            SyncFeedStatus::Failed => "failed",
            SyncFeedStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "price_pending" => Some(SyncFeedStatus::PricePending),
            "price_submitted" => Some(SyncFeedStatus::PriceSubmitted),
            "price_processing" => Some(SyncFeedStatus::PriceProcessing),
            "price_verifying" => Some(SyncFeedStatus::PriceVerifying),
            "price_verified" => Some(SyncFeedStatus::PriceVerified),
            "quantity_pending" => Some(SyncFeedStatus::QuantityPending),
            "quantity_submitted" => Some(SyncFeedStatus::QuantitySubmitted),
            "quantity_processing" => Some(SyncFeedStatus::QuantityProcessing),
            "completed" => Some(SyncFeedStatus::Completed),
            "pending" => Some(SyncFeedStatus::Pending),
            "submitted" => Some(SyncFeedStatus::Submitted),
            "processing" => Some(SyncFeedStatus::Processing),
            "done" => Some(SyncFeedStatus::Done),
            "done_verifying" => Some(SyncFeedStatus::DoneVerifying),
            "verified" => Some(SyncFeedStatus::Verified),
            "verification_failed" => Some(SyncFeedStatus::VerificationFailed),
            "failed" => Some(SyncFeedStatus::Failed),
            "cancelled" => Some(SyncFeedStatus::Cancelled),
            _ => None,
        }
    }

    /// Терминальный статус: дальнейшие переходы запрещены, опросы — no-op
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncFeedStatus::Completed
                | SyncFeedStatus::Verified
                | SyncFeedStatus::VerificationFailed
                | SyncFeedStatus::Failed
                | SyncFeedStatus::Cancelled
        )
    }

    /// Статусы, в которых следующий внешний вызов — проверка обработки фида
    pub fn is_awaiting_processing(&self) -> bool {
        matches!(
            self,
            SyncFeedStatus::PriceSubmitted
                | SyncFeedStatus::PriceProcessing
                | SyncFeedStatus::QuantitySubmitted
                | SyncFeedStatus::QuantityProcessing
                | SyncFeedStatus::Submitted
                | SyncFeedStatus::Processing
        )
    }

    /// Статусы, в которых следующий внешний вызов — сверка живой цены
    pub fn is_verifying(&self) -> bool {
        matches!(
            self,
            SyncFeedStatus::PriceVerifying | SyncFeedStatus::DoneVerifying
        )
    }

    /// Разрешён ли переход `self -> next`
    ///
    /// Переходы монотонны вдоль таблицы состояний; ни один переход не
    /// перепрыгивает обязательного предшественника. Отмена разрешена из
    /// любого нетерминального статуса.
    pub fn allows(&self, next: SyncFeedStatus) -> bool {
        use SyncFeedStatus::*;
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        match self {
            PricePending => matches!(next, PriceSubmitted | Failed),
            PriceSubmitted => matches!(next, PriceProcessing | PriceVerifying | Failed),
            PriceProcessing => matches!(next, PriceVerifying | Failed),
            PriceVerifying => matches!(next, PriceVerified | VerificationFailed | Failed),
            PriceVerified => matches!(next, QuantityPending),
            QuantityPending => matches!(next, QuantitySubmitted | Failed),
            QuantitySubmitted => matches!(next, QuantityProcessing | Completed | Failed),
            QuantityProcessing => matches!(next, Completed | Failed),
            Pending => matches!(next, Submitted | Failed),
            Submitted => matches!(next, Processing | Done | Failed),
            Processing => matches!(next, Done | Failed),
            Done => matches!(next, DoneVerifying),
            DoneVerifying => matches!(next, Verified | VerificationFailed | Failed),
            _ => false,
        }
    }
}

impl std::fmt::Display for SyncFeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_allow_nothing() {
        for terminal in [
            SyncFeedStatus::Completed,
            SyncFeedStatus::Verified,
            SyncFeedStatus::VerificationFailed,
            SyncFeedStatus::Failed,
            SyncFeedStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.allows(SyncFeedStatus::Cancelled));
            assert!(!terminal.allows(SyncFeedStatus::QuantityPending));
        }
    }

    #[test]
    fn quantity_states_unreachable_before_price_verified() {
        use SyncFeedStatus::*;
        // Ни один статус до price_verified не ведёт в квантовую фазу
        for before in [
            PricePending,
            PriceSubmitted,
            PriceProcessing,
            PriceVerifying,
        ] {
            assert!(!before.allows(QuantityPending));
            assert!(!before.allows(QuantitySubmitted));
            assert!(!before.allows(QuantityProcessing));
        }
        assert!(PriceVerified.allows(QuantityPending));
        assert!(!PriceVerified.allows(QuantitySubmitted));
    }

    #[test]
    fn cancel_allowed_from_any_non_terminal() {
        use SyncFeedStatus::*;
        for s in [
            PricePending,
            PriceSubmitted,
            PriceProcessing,
            PriceVerifying,
            PriceVerified,
            QuantityPending,
            QuantitySubmitted,
            QuantityProcessing,
            Pending,
            Submitted,
            Processing,
            Done,
            DoneVerifying,
        ] {
            assert!(s.allows(Cancelled), "{} must allow cancel", s);
        }
    }

    #[test]
    fn status_round_trip() {
        use SyncFeedStatus::*;
        for s in [
            PricePending,
            PriceVerified,
            QuantityProcessing,
            Completed,
            DoneVerifying,
            VerificationFailed,
        ] {
            assert_eq!(SyncFeedStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(SyncFeedStatus::from_str("bogus"), None);
    }
}
