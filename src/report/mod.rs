//! Market summary built from the consolidated table, and its PDF rendering.

pub mod pdf;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::consolidate::ConsolidatedTable;
use crate::error::{PipelineError, Result};
use crate::models::NOT_INFORMED;

/// Offers at or below this are treated as noise (rent, typos, partial prices)
pub const MIN_VALID_PRICE: f64 = 1000.0;

pub const UNSPECIFIED_TYPE: &str = "Não Especificado";

/// Parses a localized price: `"R$ 1.234,56"` -> `1234.56`.
///
/// Both separators present: dots group thousands, the comma is decimal.
/// Dots alone group thousands only when every group after the first has
/// three digits (`"450.000"`), otherwise the dot is decimal.
pub fn parse_price(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let kept = kept.trim_matches(|c| c == ',' || c == '.');
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let has_comma = kept.contains(',');
    let has_dot = kept.contains('.');

    let normalized = if has_comma && has_dot {
        kept.replace('.', "").replace(',', ".")
    } else if has_comma {
        if kept.matches(',').count() == 1 {
            kept.replace(',', ".")
        } else {
            kept.replace(',', "")
        }
    } else if has_dot {
        let groups: Vec<&str> = kept.split('.').collect();
        if groups.len() > 2 || groups[1..].iter().all(|g| g.len() == 3) {
            kept.replace('.', "")
        } else {
            kept.to_string()
        }
    } else {
        kept.to_string()
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `1234.5` -> `"R$ 1.234,50"`
pub fn format_brl(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }

    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::new();
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac_part}")
}

/// Best-effort category from free-text property type. First match wins:
/// land, then house, then apartment; anything else is kept as written.
pub fn classify_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NOT_INFORMED {
        return UNSPECIFIED_TYPE.to_string();
    }

    let lowered = trimmed.to_lowercase();
    if lowered.contains("terreno") || lowered.contains("lote") {
        "Terreno/Lote".to_string()
    } else if lowered.contains("casa") {
        "Casa".to_string()
    } else if lowered.contains("apartamento") {
        "Apartamento".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Last comma-separated part of the address, title-cased.
pub fn neighborhood(address: &str) -> String {
    let last = address.rsplit(',').next().unwrap_or_default().trim();
    title_case(last)
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if previous_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
}

impl PriceStats {
    fn from_prices(prices: &[f64]) -> Self {
        let count = prices.len();
        let sum: f64 = prices.iter().sum();
        Self {
            mean: if count == 0 { 0.0 } else { sum / count as f64 },
            max: prices.iter().copied().fold(f64::MIN, f64::max),
            min: prices.iter().copied().fold(f64::MAX, f64::min),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub category: String,
    pub stats: PriceStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodRow {
    pub name: String,
    pub mean: f64,
    pub count: usize,
}

/// Everything the PDF shows
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    pub total_offers: usize,
    pub overall_mean: f64,
    /// Sorted by category name
    pub categories: Vec<CategoryRow>,
    /// Ten busiest neighborhoods, most offers first
    pub top_neighborhoods: Vec<NeighborhoodRow>,
}

impl MarketSummary {
    pub fn from_table(table: &ConsolidatedTable) -> Result<Self> {
        let column = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| PipelineError::NoValidData(format!("column '{name}' missing")))
        };
        let (price_col, type_col, address_col) = (column("preco")?, column("tipo")?, column("endereco")?);

        let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut by_neighborhood: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut all = Vec::new();

        for row in &table.rows {
            let Some(price) = row.get(price_col).and_then(|p| parse_price(p)) else {
                continue;
            };
            if price <= MIN_VALID_PRICE {
                continue;
            }

            let category = classify_type(row.get(type_col).map(String::as_str).unwrap_or_default());
            let place = neighborhood(row.get(address_col).map(String::as_str).unwrap_or_default());

            all.push(price);
            by_category.entry(category).or_default().push(price);
            by_neighborhood.entry(place).or_default().push(price);
        }

        if all.is_empty() {
            return Err(PipelineError::NoValidData(
                "no offers with a valid price above the minimum".to_string(),
            ));
        }

        let overall = PriceStats::from_prices(&all);

        let categories = by_category
            .into_iter()
            .map(|(category, prices)| CategoryRow {
                category,
                stats: PriceStats::from_prices(&prices),
            })
            .collect();

        let mut neighborhoods: Vec<NeighborhoodRow> = by_neighborhood
            .into_iter()
            .map(|(name, prices)| {
                let stats = PriceStats::from_prices(&prices);
                NeighborhoodRow {
                    name,
                    mean: stats.mean,
                    count: stats.count,
                }
            })
            .collect();
        // stable sort keeps the alphabetical order among ties
        neighborhoods.sort_by(|a, b| b.count.cmp(&a.count));
        neighborhoods.truncate(10);

        Ok(Self {
            total_offers: overall.count,
            overall_mean: overall.mean,
            categories,
            top_neighborhoods: neighborhoods,
        })
    }
}

/// The `report` stage.
pub fn run_report(consolidated: &Path, output: &Path, city: &str) -> Result<MarketSummary> {
    let table = ConsolidatedTable::read(consolidated)?;
    info!("📊 Building PDF report from {} offers...", table.len());

    let summary = MarketSummary::from_table(&table)?;
    pdf::render(&summary, city, output)?;

    info!("✅ Report '{}' generated!", output.display());
    Ok(summary)
}
