use contracts::domain::a001_sync_queue_item::aggregate::SyncQueueItem;
use contracts::domain::a002_sync_feed::aggregate::{AggregatedEntry, PriceConflict};
use contracts::domain::common::AggregateId;
use std::collections::BTreeMap;

/// Допуск сравнения цен: полцента. Цены храним как f64, как и весь прайсинг
/// в системе; после нормализации до двух знаков расхождение меньше допуска
/// считается совпадением.
pub const PRICE_EPSILON: f64 = 0.005;

/// Итог агрегации очереди
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub entries: Vec<AggregatedEntry>,
    pub conflicts: Vec<PriceConflict>,
}

pub fn prices_match(a: f64, b: f64) -> bool {
    (a - b).abs() < PRICE_EPSILON
}

/// Схлопнуть позиции очереди в заявки по ASIN
///
/// Чистая функция без побочных эффектов: один и тот же снимок очереди в
/// любом порядке даёт один и тот же результат. Группа с расхождением цен
/// целиком уходит в конфликты и не попадает в заявки, пока пользователь не
/// разрешит конфликт.
pub fn aggregate(items: &[SyncQueueItem]) -> AggregationResult {
    let mut groups: BTreeMap<&str, Vec<&SyncQueueItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.asin.as_str()).or_default().push(item);
    }

    let mut result = AggregationResult::default();
    for (asin, mut group) in groups {
        // Стабильный порядок внутри группы независимо от порядка на входе
        group.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.base.id.as_string().cmp(&b.base.id.as_string()))
        });

        let mut distinct_prices: Vec<f64> = Vec::new();
        for item in &group {
            if !distinct_prices
                .iter()
                .any(|p| prices_match(*p, item.desired_price))
            {
                distinct_prices.push(item.desired_price);
            }
        }

        if distinct_prices.len() > 1 {
            distinct_prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            result.conflicts.push(PriceConflict {
                asin: asin.to_string(),
                prices: distinct_prices,
                item_ids: group.iter().map(|i| i.base.id.value()).collect(),
            });
            continue;
        }

        let quantity = group.iter().map(|i| i.desired_quantity).sum();
        result.entries.push(AggregatedEntry {
            asin: asin.to_string(),
            items: group.into_iter().cloned().collect(),
            quantity,
            price: distinct_prices[0],
            has_price_conflict: false,
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(asin: &str, price: f64, quantity: i32) -> SyncQueueItem {
        SyncQueueItem::new_for_insert(Uuid::new_v4(), asin.to_string(), price, quantity)
    }

    #[test]
    fn quantities_are_summed_per_asin() {
        let items = vec![
            item("B01X", 19.99, 1),
            item("B01X", 19.99, 1),
            item("B01X", 19.99, 1),
        ];
        let result = aggregate(&items);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].quantity, 3);
        assert_eq!(result.entries[0].price, 19.99);
        assert_eq!(result.entries[0].items.len(), 3);
    }

    #[test]
    fn price_disagreement_yields_single_conflict_and_no_entry() {
        let items = vec![
            item("B01X", 19.99, 1),
            item("B01X", 24.99, 1),
            item("B02Y", 5.00, 1),
        ];
        let result = aggregate(&items);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.asin, "B01X");
        assert_eq!(conflict.prices, vec![19.99, 24.99]);
        assert_eq!(conflict.item_ids.len(), 2);
        // Конфликтный ASIN не попал в заявки, остальные не пострадали
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].asin, "B02Y");
    }

    #[test]
    fn single_item_group_never_conflicts() {
        let result = aggregate(&[item("B03Z", 12.34, 1)]);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].quantity, 1);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let a = item("B01X", 19.99, 1);
        let b = item("B01X", 19.99, 2);
        let c = item("B02Y", 7.50, 1);
        let d = item("B02Y", 8.50, 1);

        let forward = aggregate(&[a.clone(), b.clone(), c.clone(), d.clone()]);
        let reversed = aggregate(&[d, c, b, a]);

        let entry_keys = |r: &AggregationResult| -> Vec<(String, i32, String)> {
            r.entries
                .iter()
                .map(|e| (e.asin.clone(), e.quantity, format!("{:.2}", e.price)))
                .collect()
        };
        let conflict_keys = |r: &AggregationResult| -> Vec<(String, usize)> {
            r.conflicts
                .iter()
                .map(|c| (c.asin.clone(), c.item_ids.len()))
                .collect()
        };
        assert_eq!(entry_keys(&forward), entry_keys(&reversed));
        assert_eq!(conflict_keys(&forward), conflict_keys(&reversed));
    }

    #[test]
    fn near_equal_prices_within_epsilon_agree() {
        let items = vec![item("B01X", 19.99, 1), item("B01X", 19.992, 1)];
        let result = aggregate(&items);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].quantity, 2);
    }
}
