//! Column role inference from dataset headers.
//!
//! Each semantic role is matched against a keyword list (case-insensitive
//! substring match) in the dataset's column order. Roles without a match fall
//! back to a fixed column position and produce a [`ColumnNotice`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::PipelineError;

pub const MIN_COLUMNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Timestamp,
    Identifier,
    Metric,
}

impl ColumnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Identifier => "identifier",
            Self::Metric => "metric",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRule {
    pub role: ColumnRole,
    pub keywords: &'static [&'static str],
    pub fallback_index: usize,
}

pub const DEFAULT_COLUMN_RULES: [ColumnRule; 3] = [
    ColumnRule {
        role: ColumnRole::Timestamp,
        keywords: &["datetime", "date", "日期时间", "时间", "日期"],
        fallback_index: 0,
    },
    ColumnRule {
        role: ColumnRole::Identifier,
        keywords: &["asin", "产品编号", "产品id"],
        fallback_index: 1,
    },
    ColumnRule {
        role: ColumnRole::Metric,
        keywords: &["rank", "排名", "销量排名", "sales rank"],
        fallback_index: 2,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedColumns {
    pub timestamp: String,
    pub identifier: String,
    pub metric: String,
}

/// A role that was assigned positionally because no header matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNotice {
    pub role: ColumnRole,
    pub column: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnResolution {
    pub columns: ResolvedColumns,
    pub notices: Vec<ColumnNotice>,
}

pub fn resolve_columns<S: AsRef<str>>(
    column_names: &[S],
) -> Result<ColumnResolution, PipelineError> {
    resolve_columns_with_rules(column_names, &DEFAULT_COLUMN_RULES)
}

/// Resolves every role in `rules`. Roles missing from `rules` are resolved
/// with their default rule.
pub fn resolve_columns_with_rules<S: AsRef<str>>(
    column_names: &[S],
    rules: &[ColumnRule],
) -> Result<ColumnResolution, PipelineError> {
    if column_names.len() < MIN_COLUMNS {
        return Err(PipelineError::InsufficientColumns {
            found: column_names.len(),
            required: MIN_COLUMNS,
        });
    }

    let lowered: Vec<String> = column_names
        .iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();

    let mut notices = Vec::new();
    let mut pick = |role: ColumnRole| -> Result<String, PipelineError> {
        let rule = rules
            .iter()
            .find(|rule| rule.role == role)
            .or_else(|| DEFAULT_COLUMN_RULES.iter().find(|rule| rule.role == role))
            .copied()
            .unwrap_or(DEFAULT_COLUMN_RULES[0]);

        if let Some(idx) = find_keyword_match(&lowered, rule.keywords) {
            return Ok(column_names[idx].as_ref().to_string());
        }

        let column = column_names
            .get(rule.fallback_index)
            .map(|name| name.as_ref().to_string())
            .ok_or(PipelineError::InsufficientColumns {
                found: column_names.len(),
                required: rule.fallback_index + 1,
            })?;

        info!(
            component = "columns",
            event = "columns.fallback",
            role = role.as_str(),
            column = %column,
            position = rule.fallback_index
        );
        notices.push(ColumnNotice {
            role,
            column: column.clone(),
            position: rule.fallback_index,
        });
        Ok(column)
    };

    let timestamp = pick(ColumnRole::Timestamp)?;
    let identifier = pick(ColumnRole::Identifier)?;
    let metric = pick(ColumnRole::Metric)?;

    Ok(ColumnResolution {
        columns: ResolvedColumns {
            timestamp,
            identifier,
            metric,
        },
        notices,
    })
}

fn find_keyword_match(lowered_columns: &[String], keywords: &[&str]) -> Option<usize> {
    lowered_columns
        .iter()
        .position(|column| {
            keywords
                .iter()
                .any(|keyword| column.contains(keyword.to_lowercase().as_str()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_english_headers_case_insensitively() {
        let resolution =
            resolve_columns(&["Sales Rank", "DateTime", "ASIN"]).expect("three columns resolve");

        assert_eq!(resolution.columns.timestamp, "DateTime");
        assert_eq!(resolution.columns.identifier, "ASIN");
        assert_eq!(resolution.columns.metric, "Sales Rank");
        assert!(resolution.notices.is_empty());
    }

    #[test]
    fn matches_chinese_headers() {
        let resolution =
            resolve_columns(&["日期时间", "产品编号", "销量排名"]).expect("three columns resolve");

        assert_eq!(resolution.columns.timestamp, "日期时间");
        assert_eq!(resolution.columns.identifier, "产品编号");
        assert_eq!(resolution.columns.metric, "销量排名");
    }

    #[test]
    fn first_matching_column_in_dataset_order_wins() {
        let resolution = resolve_columns(&["update_date", "created_date", "asin", "rank"])
            .expect("columns resolve");

        assert_eq!(resolution.columns.timestamp, "update_date");
    }

    #[test]
    fn unmatched_roles_fall_back_to_positions_with_notices() {
        let resolution = resolve_columns(&["when", "sku", "rank", "extra"]).expect("resolves");

        assert_eq!(resolution.columns.timestamp, "when");
        assert_eq!(resolution.columns.identifier, "sku");
        assert_eq!(resolution.columns.metric, "rank");
        assert_eq!(
            resolution.notices,
            vec![
                ColumnNotice {
                    role: ColumnRole::Timestamp,
                    column: "when".to_string(),
                    position: 0,
                },
                ColumnNotice {
                    role: ColumnRole::Identifier,
                    column: "sku".to_string(),
                    position: 1,
                },
            ]
        );
    }

    #[test]
    fn fewer_than_three_columns_fail() {
        let err = resolve_columns(&["date", "asin"]).expect_err("two columns are not enough");
        assert!(matches!(
            err,
            PipelineError::InsufficientColumns {
                found: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn custom_rules_replace_keyword_lists() {
        let rules = [ColumnRule {
            role: ColumnRole::Identifier,
            keywords: &["sku"],
            fallback_index: 1,
        }];
        let resolution =
            resolve_columns_with_rules(&["date", "rank", "sku"], &rules).expect("resolves");

        assert_eq!(resolution.columns.identifier, "sku");
        assert_eq!(resolution.columns.metric, "rank");
        assert!(resolution.notices.is_empty());
    }

    #[test]
    fn rule_keywords_match_regardless_of_case() {
        let rules = [ColumnRule {
            role: ColumnRole::Identifier,
            keywords: &["SKU"],
            fallback_index: 0,
        }];
        let resolution =
            resolve_columns_with_rules(&["Date", "Rank", "Sku_Code"], &rules).expect("resolves");

        assert_eq!(resolution.columns.identifier, "Sku_Code");
        assert!(resolution.notices.is_empty());
    }
}
