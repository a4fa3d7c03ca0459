//! Natural-language analysis of collection data.
//!
//! The store assembles a fixed prompt embedding the candidate documents and
//! a caller-supplied condition string, sends it through an opaque
//! [`TextCompletion`] collaborator once (no retry), and parses the JSON it
//! returns. A response that cannot be parsed, or that lacks the `indexes`
//! array, fails with [`StoreError::Analysis`].

use crate::db::Borealis;
use crate::error::{Result, StoreError};
use crate::query::Conditions;
use crate::types::{Document, Value};
use serde::Deserialize;

/// Maximum length of the natural-language condition string.
pub const MAX_QUERY_LEN: usize = 1024;

/// Opaque text-completion collaborator: prompt in, response text out.
pub trait TextCompletion {
    fn complete(&self, prompt: &str, model: &str, api_key: &str) -> Result<String>;
}

/// What to analyse and how. Exactly one of `collection` and `data` must be
/// set; `filter` narrows the candidates before the prompt is built.
#[derive(Default)]
pub struct AnalyseRequest<'a> {
    pub collection: Option<&'a str>,
    pub data: Option<Vec<Document>>,
    pub filter: Option<&'a Conditions>,
    pub model: &'a str,
    pub api_key: &'a str,
    pub query: &'a str,
}

/// A parsed analysis response, with the selected documents resolved.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub indexes: Vec<usize>,
    pub reason: String,
    pub message: String,
    pub data: Vec<Document>,
}

#[derive(Deserialize)]
struct RawResponse {
    indexes: Option<Vec<usize>>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

impl Borealis {
    /// Run a natural-language analysis over a collection or an inline
    /// document array.
    pub fn analyse(
        &self,
        request: AnalyseRequest<'_>,
        completion: &dyn TextCompletion,
    ) -> Result<Analysis> {
        if request.data.is_some() && request.collection.is_some() {
            return Err(StoreError::Validation(
                "cannot specify a collection when data is provided".to_string(),
            ));
        }
        if request.model.is_empty() {
            return Err(StoreError::Validation("model is required".to_string()));
        }
        if request.api_key.is_empty() {
            return Err(StoreError::Validation("api key is required".to_string()));
        }
        if request.query.is_empty() {
            return Err(StoreError::Validation("query is required".to_string()));
        }
        if request.query.len() > MAX_QUERY_LEN {
            return Err(StoreError::Validation(format!(
                "query exceeds the maximum length of {} characters",
                MAX_QUERY_LEN
            )));
        }

        let mut candidates = match (request.data, request.collection) {
            (Some(data), _) => data,
            (None, Some(collection)) => self.get(collection)?.into_vec(),
            (None, None) => {
                return Err(StoreError::Validation(
                    "either a collection or a data array is required".to_string(),
                ));
            }
        };
        if let Some(filter) = request.filter {
            candidates.retain(|d| filter.matches(d));
        }
        if candidates.is_empty() {
            return Err(StoreError::NotFound("no matching data".to_string()));
        }

        let prompt = build_prompt(&candidates, request.query)?;
        let response = completion.complete(&prompt, request.model, request.api_key)?;
        parse_response(&response, &candidates)
    }
}

fn build_prompt(candidates: &[Document], query: &str) -> Result<String> {
    let array = Value::Array(candidates.iter().cloned().map(Value::from).collect());
    let rendered = serde_json::to_string_pretty(&array.to_json())?;
    Ok(format!(
        "Analyze the following data array according to the specified conditions.\n\
         Return a JSON response with the exact structure shown in the example.\n\
         \n\
         Example Response Format:\n\
         {{\n\
             \"indexes\": [0, 2, 3],\n\
             \"reason\": \"These items match the criteria because...\",\n\
             \"message\": \"Additional insights about the selection\"\n\
         }}\n\
         \n\
         Data to Analyze:\n\
         {}\n\
         \n\
         Conditions:\n\
         {}\n\
         \n\
         Important Rules:\n\
         1. Only return valid JSON in the specified format\n\
         2. \"indexes\" must be array of numbers matching data array indices\n\
         3. \"reason\" should explain your selection logic\n\
         4. Keep the response concise but meaningful\n",
        rendered, query
    ))
}

fn parse_response(response: &str, candidates: &[Document]) -> Result<Analysis> {
    // Models wrap JSON in markdown fences more often than not.
    let cleaned = response.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let raw: RawResponse = serde_json::from_str(cleaned)
        .map_err(|e| StoreError::Analysis(format!("response is not valid JSON: {}", e)))?;
    let indexes = raw.indexes.ok_or_else(|| {
        StoreError::Analysis("response is missing the indexes array".to_string())
    })?;

    let mut data = Vec::with_capacity(indexes.len());
    for &index in &indexes {
        match candidates.get(index) {
            Some(document) => data.push(document.clone()),
            None => log::warn!("analysis response referenced out-of-range index {}", index),
        }
    }

    Ok(Analysis {
        indexes,
        reason: raw.reason,
        message: raw.message,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn candidates() -> Vec<Document> {
        vec![
            doc! { "name" => "Ada", "age" => 36 },
            doc! { "name" => "Brian", "age" => 17 },
            doc! { "name" => "Grace", "age" => 45 },
        ]
    }

    #[test]
    fn prompt_embeds_data_and_query() {
        let prompt = build_prompt(&candidates(), "adults only").unwrap();
        assert!(prompt.contains("\"Ada\""));
        assert!(prompt.contains("adults only"));
        assert!(prompt.contains("indexes"));
    }

    #[test]
    fn parses_plain_and_fenced_responses() {
        let body = r#"{"indexes": [0, 2], "reason": "adults", "message": "ok"}"#;
        for response in [body.to_string(), format!("```json\n{}\n```", body)] {
            let analysis = parse_response(&response, &candidates()).unwrap();
            assert_eq!(analysis.indexes, vec![0, 2]);
            assert_eq!(analysis.data.len(), 2);
            assert_eq!(analysis.data[0].get("name"), Some(&Value::from("Ada")));
            assert_eq!(analysis.reason, "adults");
        }
    }

    #[test]
    fn missing_indexes_is_a_distinct_failure() {
        let result = parse_response(r#"{"reason": "no list"}"#, &candidates());
        assert!(matches!(result, Err(StoreError::Analysis(_))));
    }

    #[test]
    fn unparsable_response_is_a_distinct_failure() {
        let result = parse_response("sorry, I cannot do that", &candidates());
        assert!(matches!(result, Err(StoreError::Analysis(_))));
    }

    #[test]
    fn out_of_range_indexes_are_skipped() {
        let analysis =
            parse_response(r#"{"indexes": [1, 99]}"#, &candidates()).unwrap();
        assert_eq!(analysis.data.len(), 1);
        assert_eq!(analysis.data[0].get("name"), Some(&Value::from("Brian")));
    }
}
