//! Prompt templates offered to clients.

use crate::error::{Result, ServerError};
use rmcp::model::{GetPromptResult, JsonObject, Prompt};
use serde_json::{Value, json};

pub const RAG_QUERY_PROMPT: &str = "rag_query_prompt";
pub const DOCUMENT_ANALYSIS_PROMPT: &str = "document_analysis_prompt";

/// # Errors
///
/// Never fails in practice; the prompt definitions are static.
pub fn list_prompts() -> Result<Vec<Prompt>> {
    let defs = json!([
        {
            "name": RAG_QUERY_PROMPT,
            "description": "Generate a RAG query prompt with optional context",
            "arguments": [
                {"name": "question", "description": "The question to answer", "required": true},
                {"name": "context", "description": "Optional additional context", "required": false}
            ]
        },
        {
            "name": DOCUMENT_ANALYSIS_PROMPT,
            "description": "Generate a document analysis prompt",
            "arguments": [
                {"name": "document_id", "description": "Document to analyze", "required": true},
                {
                    "name": "analysis_type",
                    "description": "summary, entities, topics or sentiment (default: summary)",
                    "required": false
                }
            ]
        }
    ]);
    Ok(serde_json::from_value(defs)?)
}

/// Render a prompt by name.
///
/// # Errors
///
/// Returns [`ServerError::InvalidArguments`] for an unknown prompt or a missing required argument.
pub fn get_prompt(name: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult> {
    let (description, text) = match name {
        RAG_QUERY_PROMPT => {
            let question = required(arguments, "question")?;
            let context = optional(arguments, "context");
            (
                "RAG query prompt",
                rag_query_prompt(question, context),
            )
        }
        DOCUMENT_ANALYSIS_PROMPT => {
            let document_id = required(arguments, "document_id")?;
            let analysis_type = optional(arguments, "analysis_type").unwrap_or("summary");
            (
                "Document analysis prompt",
                document_analysis_prompt(document_id, analysis_type),
            )
        }
        other => {
            return Err(ServerError::InvalidArguments(format!(
                "unknown prompt: {other}"
            )));
        }
    };

    let result = json!({
        "description": description,
        "messages": [
            {"role": "user", "content": {"type": "text", "text": text}}
        ]
    });
    Ok(serde_json::from_value(result)?)
}

#[must_use]
pub fn rag_query_prompt(question: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Please answer the following question using the R2R knowledge base:\n\nQuestion: {question}\n"
    );
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("\nAdditional Context: {context}\n"));
    }
    prompt.push_str(
        "\nPlease provide:\n\
         1. A clear, concise answer based on the retrieved documents\n\
         2. Citations to specific sources when possible\n\
         3. Confidence level in your answer (high/medium/low)\n",
    );
    prompt
}

#[must_use]
pub fn document_analysis_prompt(document_id: &str, analysis_type: &str) -> String {
    match analysis_type {
        "summary" => format!(
            "Analyze the document {document_id} and provide:\n\
             1. A concise summary (2-3 sentences)\n\
             2. Key topics and themes\n\
             3. Document type and structure\n"
        ),
        "entities" => format!(
            "Extract structured information from document {document_id}:\n\
             1. Named entities (people, organizations, locations)\n\
             2. Key concepts and terminology\n\
             3. Dates and numerical data\n"
        ),
        "topics" => format!(
            "Identify the main topics in document {document_id}:\n\
             1. Primary subject areas\n\
             2. Related themes and concepts\n\
             3. Suggested tags for categorization\n"
        ),
        "sentiment" => format!(
            "Analyze the sentiment and tone of document {document_id}:\n\
             1. Overall sentiment (positive/neutral/negative)\n\
             2. Emotional tone and writing style\n\
             3. Intended audience and purpose\n"
        ),
        other => format!("Analyze document {document_id} (type: {other})"),
    }
}

fn optional<'a>(arguments: Option<&'a JsonObject>, key: &str) -> Option<&'a str> {
    arguments?.get(key).and_then(Value::as_str)
}

fn required<'a>(arguments: Option<&'a JsonObject>, key: &str) -> Result<&'a str> {
    optional(arguments, key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServerError::InvalidArguments(format!("missing required argument: {key}")))
}
