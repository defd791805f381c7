//! Selector inference: asks the model which CSS selectors describe a
//! listing page, then validates whatever comes back.

use std::sync::Arc;

use scraper::{ElementRef, Html};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::llm::json::strip_code_fences;
use crate::llm::LanguageModel;
use crate::models::SelectorSet;

/// Characters of cleaned HTML sent to the model
pub const HTML_BUDGET: usize = 15_000;

const STRIPPED_TAGS: [&str; 6] = ["script", "style", "header", "footer", "nav", "svg"];

pub struct SelectorInference {
    model: Arc<dyn LanguageModel>,
    html_budget: usize,
}

impl SelectorInference {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            html_budget: HTML_BUDGET,
        }
    }

    /// Infers the selector set for a listing page's HTML.
    pub async fn infer(&self, html: &str) -> Result<SelectorSet> {
        let full = clean_html(html);
        let cleaned = truncate_chars(&full, self.html_budget);
        let prompt = build_prompt(cleaned);

        info!("  🧠 Sending {} chars of HTML to the model...", cleaned.chars().count());
        let response = self.model.generate(&prompt).await.map_err(|e| {
            if e.is_quota_exceeded() {
                PipelineError::QuotaExceeded
            } else {
                PipelineError::ProviderError(e.to_string())
            }
        })?;

        debug!("Model response: {}", response);
        parse_selector_response(&response)
    }
}

/// Turns raw model output into a validated selector set.
pub fn parse_selector_response(response: &str) -> Result<SelectorSet> {
    let text = strip_code_fences(response);
    let value: Value = serde_json::from_str(&text).map_err(|_| PipelineError::InvalidModelResponse {
        raw: response.trim().to_string(),
    })?;

    validate(&value).ok_or_else(|| PipelineError::InvalidConfiguration { raw: value.to_string() })
}

fn validate(value: &Value) -> Option<SelectorSet> {
    let map = value.as_object()?;
    let container = map
        .get("container_anuncio")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let text_of = |key: &str| -> String {
        map.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let next_page = Some(text_of("proxima_pagina")).filter(|s| !s.is_empty());

    Some(SelectorSet {
        container: container.to_string(),
        price: text_of("preco"),
        address: text_of("endereco"),
        description: text_of("descricao"),
        next_page,
    })
}

pub fn build_prompt(html: &str) -> String {
    format!(
        r#"
Analise o código HTML a seguir de uma página de listagem de imóveis e gere um JSON com os seletores CSS para os seguintes campos:
1. 'container_anuncio': O seletor principal que engloba um único anúncio de imóvel na lista.
2. 'preco': Seletor para o preço do imóvel.
3. 'endereco': Seletor para o endereço ou bairro.
4. 'descricao': Seletor para o bloco de texto com a descrição do imóvel (onde podem estar quartos, banheiros, etc.).
5. 'proxima_pagina': Seletor para o link ou botão de "próxima página" ou "next". Se não encontrar, retorne null.

Instruções:
- Forneça os seletores DENTRO do 'container_anuncio', exceto para 'proxima_pagina'.
- O formato da saída deve ser um JSON válido, e nada mais.

HTML:
```html
{html}
```
JSON de saída:
"#
    )
}

/// Drops non-content elements and comments, then re-serializes the document.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    write_element(document.root_element(), &mut out);
    out
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if STRIPPED_TAGS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&value.replace('"', "&quot;"));
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            write_element(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push_str(&escape_text(trimmed));
            }
        }
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Longest prefix of at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{quota_error, ScriptedModel};
    use crate::llm::LlmError;

    const LISTING_PAGE: &str = r#"
        <html><head><script>var x = 1;</script><style>.a{}</style></head>
        <body>
          <header>Logo</header><nav><a href="/">Home</a></nav>
          <div class="card"><span class="price">R$ 300.000</span><svg><path d="M0"/></svg></div>
          <!-- tracking -->
          <footer>Contato</footer>
        </body></html>"#;

    #[test]
    fn cleaning_drops_non_content_tags() {
        let cleaned = clean_html(LISTING_PAGE);
        assert!(cleaned.contains(r#"<div class="card"><span class="price">R$ 300.000</span></div>"#));
        for gone in ["script", "style", "header", "nav", "footer", "svg", "tracking", "Logo"] {
            assert!(!cleaned.contains(gone), "{gone} survived: {cleaned}");
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ação", 2), "aç");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn accepts_fenced_response() {
        let response = "```json\n{\"container_anuncio\": \"div.card\", \"preco\": \".price\", \"endereco\": null, \"descricao\": \".desc\", \"proxima_pagina\": null}\n```";
        let selectors = parse_selector_response(response).unwrap();
        assert_eq!(selectors.container, "div.card");
        assert_eq!(selectors.price, ".price");
        assert_eq!(selectors.address, "");
        assert_eq!(selectors.next_page, None);
    }

    #[test]
    fn unparsable_response_is_invalid_model_response() {
        let err = parse_selector_response("Desculpe, não consegui.").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidModelResponse { .. }));
    }

    #[test]
    fn missing_or_empty_container_is_invalid_configuration() {
        for response in [
            r#"{"preco": ".price"}"#,
            r#"{"container_anuncio": ""}"#,
            r#"{"container_anuncio": null}"#,
            r#"[".card"]"#,
        ] {
            let err = parse_selector_response(response).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidConfiguration { .. }),
                "{response} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn infer_sends_cleaned_html_in_the_prompt() {
        let model = Arc::new(ScriptedModel::replying(r#"{"container_anuncio": ".card", "proxima_pagina": "a.next"}"#));
        let engine = SelectorInference::new(model.clone());

        let selectors = engine.infer(LISTING_PAGE).await.unwrap();
        assert_eq!(selectors.next_page.as_deref(), Some("a.next"));

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("R$ 300.000"));
        assert!(!prompts[0].contains("var x = 1"));
    }

    #[tokio::test]
    async fn html_budget_counts_characters() {
        let model = Arc::new(ScriptedModel::replying(r#"{"container_anuncio": ".card"}"#));
        let engine = SelectorInference {
            model: model.clone(),
            html_budget: 40,
        };
        let html = format!("<html><body><p>{}</p></body></html>", "ã".repeat(100));

        engine.infer(&html).await.unwrap();

        let full = clean_html(&html);
        let sent = truncate_chars(&full, 40);
        assert_eq!(sent.chars().count(), 40);
        assert!(sent.len() > 40);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains(sent));
        assert!(!prompts[0].contains(truncate_chars(&full, 41)));
    }

    #[tokio::test]
    async fn infer_classifies_provider_failures() {
        let engine = SelectorInference::new(Arc::new(ScriptedModel::new(vec![Err(quota_error())])));
        assert!(matches!(engine.infer("<p>x</p>").await, Err(PipelineError::QuotaExceeded)));

        let engine = SelectorInference::new(Arc::new(ScriptedModel::new(vec![Err(LlmError::Api {
            status: 500,
            message: "backend error".into(),
        })])));
        assert!(matches!(engine.infer("<p>x</p>").await, Err(PipelineError::ProviderError(_))));
    }
}
