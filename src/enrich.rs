use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::inference::truncate_chars;
use crate::llm::json::extract_json_object;
use crate::llm::LanguageModel;
use crate::models::NOT_INFORMED;

/// Characters of description text sent to the model
pub const DESCRIPTION_BUDGET: usize = 2_000;

/// Structured fields pulled out of a listing's free-text description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDetails {
    pub code: Option<String>,
    pub property_type: Option<String>,
    pub area: Option<String>,
    pub bedrooms: Option<u32>,
    pub living_rooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub parking: Option<u32>,
}

impl ListingDetails {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            code: text_field(map, "codigo"),
            property_type: text_field(map, "tipo"),
            area: text_field(map, "area"),
            bedrooms: count_field(map, "quartos"),
            living_rooms: count_field(map, "salas"),
            bathrooms: count_field(map, "banheiros"),
            parking: count_field(map, "garagem"),
        }
    }
}

/// Best-effort enrichment of listing descriptions. Never fails: anything
/// that goes wrong yields empty details.
pub struct DescriptionParser {
    model: Option<Arc<dyn LanguageModel>>,
}

impl DescriptionParser {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Parser used when no API key is configured
    pub fn disabled() -> Self {
        Self { model: None }
    }

    /// The model to ask about `text`, if it is worth asking at all.
    fn model_for(&self, text: &str) -> Option<&Arc<dyn LanguageModel>> {
        let text = text.trim();
        if text.is_empty() || text == NOT_INFORMED {
            return None;
        }
        self.model.as_ref()
    }

    /// Whether a call to [`parse`](Self::parse) may reach the model.
    pub fn would_call_model(&self, text: &str) -> bool {
        self.model_for(text).is_some()
    }

    pub async fn parse(&self, text: &str) -> ListingDetails {
        let Some(model) = self.model_for(text) else {
            return ListingDetails::default();
        };

        let prompt = build_prompt(truncate_chars(text.trim(), DESCRIPTION_BUDGET));
        match model.generate(&prompt).await {
            Ok(response) => parse_details(&response),
            Err(e) => {
                debug!("Description parsing skipped: {}", e);
                ListingDetails::default()
            }
        }
    }
}

/// Reads the model's JSON answer; empty details when nothing usable is found.
pub fn parse_details(response: &str) -> ListingDetails {
    extract_json_object(response)
        .map(|map| ListingDetails::from_map(&map))
        .unwrap_or_default()
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    match map.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        r#"
Analise o texto a seguir. Extraia APENAS as seguintes informações e retorne um JSON válido:
- "codigo" (string, o código/referência do imóvel)
- "tipo" (string, ex: "Apartamento", "Casa", "Terreno/Lote")
- "quartos" (número inteiro)
- "salas" (número inteiro)
- "banheiros" (número inteiro)
- "garagem" (número inteiro de vagas)
- "area" (string, ex: "120m²")

Se uma informação não for encontrada, retorne null para o campo.

Texto: "{text}"
JSON de saída:
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn reads_numbers_and_numeric_strings() {
        let details = parse_details(
            r#"```json
            {"codigo": "AP-102", "tipo": "Apartamento", "quartos": 3, "salas": "1",
             "banheiros": 2.0, "garagem": null, "area": "120m²"}
            ```"#,
        );

        assert_eq!(details.code.as_deref(), Some("AP-102"));
        assert_eq!(details.property_type.as_deref(), Some("Apartamento"));
        assert_eq!(details.bedrooms, Some(3));
        assert_eq!(details.living_rooms, Some(1));
        assert_eq!(details.bathrooms, Some(2));
        assert_eq!(details.parking, None);
        assert_eq!(details.area.as_deref(), Some("120m²"));
    }

    #[test]
    fn garbage_yields_empty_details() {
        assert!(parse_details("").is_empty());
        assert!(parse_details("sem json").is_empty());
        assert!(parse_details(r#"{"quartos": 3, "area": "#).is_empty());
    }

    #[tokio::test]
    async fn empty_or_sentinel_text_never_calls_the_model() {
        let model = Arc::new(ScriptedModel::replying(r#"{"quartos": 2}"#));
        let parser = DescriptionParser::new(model.clone());

        assert!(parser.parse("").await.is_empty());
        assert!(parser.parse("   ").await.is_empty());
        assert!(parser.parse(NOT_INFORMED).await.is_empty());
        assert!(!parser.would_call_model(NOT_INFORMED));
        assert_eq!(model.calls(), 0);

        assert_eq!(parser.parse("2 quartos").await.bedrooms, Some(2));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failures_yield_empty_details() {
        let parser = DescriptionParser::new(Arc::new(ScriptedModel::new(vec![])));
        assert!(parser.parse("Casa com 3 quartos").await.is_empty());

        let disabled = DescriptionParser::disabled();
        assert!(!disabled.would_call_model("Casa com 3 quartos"));
        assert!(disabled.parse("Casa com 3 quartos").await.is_empty());
    }

    #[tokio::test]
    async fn long_descriptions_are_truncated() {
        let model = Arc::new(ScriptedModel::replying("{}"));
        let parser = DescriptionParser::new(model.clone());

        parser.parse(&"x".repeat(DESCRIPTION_BUDGET + 500)).await;

        let prompt = &model.prompts.lock().unwrap()[0];
        assert!(prompt.contains(&"x".repeat(DESCRIPTION_BUDGET)));
        assert!(!prompt.contains(&"x".repeat(DESCRIPTION_BUDGET + 1)));
    }
}
