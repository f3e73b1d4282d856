use serde::{Deserialize, Serialize};

/// Типы торговых площадок
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketplaceType {
    Amazon,
    Ebay,
    BrickLink,
}

impl MarketplaceType {
    /// Получить код площадки
    pub fn code(&self) -> &'static str {
        match self {
            MarketplaceType::Amazon => "mp-amazon",
            MarketplaceType::Ebay => "mp-ebay",
            MarketplaceType::BrickLink => "mp-bricklink",
        }
    }

    /// Получить человекочитаемое название
    pub fn display_name(&self) -> &'static str {
        match self {
            MarketplaceType::Amazon => "Amazon",
            MarketplaceType::Ebay => "eBay",
            MarketplaceType::BrickLink => "BrickLink",
        }
    }

    /// Получить все типы площадок
    pub fn all() -> Vec<MarketplaceType> {
        vec![
            MarketplaceType::Amazon,
            MarketplaceType::Ebay,
            MarketplaceType::BrickLink,
        ]
    }

    /// Парсинг из строки
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "mp-amazon" => Some(MarketplaceType::Amazon),
            "mp-ebay" => Some(MarketplaceType::Ebay),
            "mp-bricklink" => Some(MarketplaceType::BrickLink),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketplaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
