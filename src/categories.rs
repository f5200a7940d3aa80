//! Fixed category table for orbitask
//!
//! Tasks carry a free-form category string. Grouping resolves it against this
//! table to obtain a display name and a color theme; anything not in the table
//! resolves to the unclassified entry.

use serde::{Deserialize, Serialize};

/// Category used when a task carries none
pub const DEFAULT_CATEGORY: &str = "general";

/// Color pair used to paint a system's sun
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub primary: String,
    pub secondary: String,
}

/// A known task category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Work,
    Personal,
    Study,
    Health,
    Finance,
    Shopping,
    Hobby,
    General,
    Unclassified,
}

impl Category {
    /// Resolves a raw category key. Unknown keys map to `Unclassified`.
    pub fn from_key(key: &str) -> Self {
        match normalize_category(key).as_str() {
            "work" => Category::Work,
            "personal" => Category::Personal,
            "study" => Category::Study,
            "health" => Category::Health,
            "finance" => Category::Finance,
            "shopping" => Category::Shopping,
            "hobby" => Category::Hobby,
            "general" => Category::General,
            _ => Category::Unclassified,
        }
    }

    /// Gets the display name shown on the system's sun
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Work => "업무",
            Category::Personal => "개인",
            Category::Study => "학습",
            Category::Health => "건강",
            Category::Finance => "재정",
            Category::Shopping => "쇼핑",
            Category::Hobby => "취미",
            Category::General => "일반",
            Category::Unclassified => "미분류",
        }
    }

    /// Gets the color theme of this category
    pub fn theme(&self) -> Theme {
        let (primary, secondary) = match self {
            Category::Work => ("#4a90e2", "#2c5aa0"),
            Category::Personal => ("#f5a623", "#c47d0e"),
            Category::Study => ("#7ed321", "#4f8a10"),
            Category::Health => ("#e94e77", "#a8324f"),
            Category::Finance => ("#50e3c2", "#2a9d8f"),
            Category::Shopping => ("#bd10e0", "#7a0a91"),
            Category::Hobby => ("#f8e71c", "#b8a90f"),
            Category::General => ("#ffd54f", "#ff9800"),
            Category::Unclassified => ("#9b9b9b", "#5f5f5f"),
        };
        Theme {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }
}

/// Normalizes a raw category string into a grouping key.
///
/// Blank categories collapse to [`DEFAULT_CATEGORY`].
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Returns every category in the table, in display order
pub fn known_categories() -> Vec<Category> {
    vec![
        Category::Work,
        Category::Personal,
        Category::Study,
        Category::Health,
        Category::Finance,
        Category::Shopping,
        Category::Hobby,
        Category::General,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys_resolve() {
        assert_eq!(Category::from_key("work"), Category::Work);
        assert_eq!(Category::from_key(" Work "), Category::Work);
        assert_eq!(Category::from_key("work").display_name(), "업무");
    }

    #[test]
    fn test_blank_key_is_general() {
        assert_eq!(normalize_category("   "), "general");
        assert_eq!(Category::from_key(""), Category::General);
    }

    #[test]
    fn test_unknown_key_is_unclassified() {
        let category = Category::from_key("gardening");
        assert_eq!(category, Category::Unclassified);
        assert_eq!(category.display_name(), "미분류");
    }

    #[test]
    fn test_known_categories_round_trip_through_keys() {
        for category in known_categories() {
            let key = serde_json::to_value(category).unwrap();
            let key = key.as_str().unwrap();
            assert_eq!(Category::from_key(key), category);
        }
    }
}
