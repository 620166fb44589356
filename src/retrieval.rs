//! Retrieval pipeline (C6): query -> coarse chunk recall -> article
//! expansion -> fine rerank -> top-N, plus the answer-generation layer
//! that turns a scored article list into a chat response.

use crate::config::RetrievalConfig;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::generator::{Generator, SamplingParams};
use crate::rewriter::{robust_json_parse, rewrite_query};
use crate::store::KnowledgeStore;
use crate::types::ArticleMeta;
use serde_json::Value;
use std::collections::HashSet;

/// One reranked result: cosine score against the query, paired with the
/// article it scores.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub score: f32,
    pub article: ArticleMeta,
}

/// Outcome of a single retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub articles: Vec<ScoredArticle>,
    pub low_confidence: bool,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Steps 1-7 of the retrieval pipeline.
pub async fn retrieve(
    store: &KnowledgeStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    config: &RetrievalConfig,
    query: &str,
) -> Result<RetrievalResult> {
    // Step 1: rewrite, falling back to the raw query on any failure.
    let rewrite_sampling = SamplingParams {
        temperature: config.rewrite_temperature,
        top_p: config.rewrite_top_p,
        max_tokens: config.rewrite_max_tokens,
    };
    let search_words = rewrite_query(generator, query, rewrite_sampling).await;

    // Step 2: embed once, reused for recall and rerank.
    let q = embedder.embed_one(&search_words).await?;

    // Step 3: coarse recall.
    let recalled = store.search_chunks(&q, config.top_k_retrieval).await?;

    // Step 4: article expansion.
    let mut article_ids: HashSet<String> = HashSet::new();
    for (chunk_id, _score) in &recalled {
        for article_id in store.get_chunk_article_ids(*chunk_id).await {
            article_ids.insert(article_id);
        }
    }

    // Step 5: fine rerank against article embeddings.
    let mut scored = Vec::with_capacity(article_ids.len());
    for article_id in article_ids {
        let Some(vector) = store.article_embedding(&article_id).await? else {
            continue;
        };
        let Some(article) = store.get_article(&article_id).await else {
            continue;
        };
        let score = cosine_similarity(&q, &vector);
        scored.push((score, article));
    }
    scored.sort_by(|a, b| match b.0.partial_cmp(&a.0).unwrap() {
        std::cmp::Ordering::Equal => a.1.article_id.cmp(&b.1.article_id),
        other => other,
    });

    // Step 6: truncate and threshold.
    scored.truncate(config.max_retrieved_articles);
    let low_confidence = scored
        .first()
        .map(|(score, _)| *score < config.similarity_threshold)
        .unwrap_or(true);

    Ok(RetrievalResult {
        articles: scored
            .into_iter()
            .map(|(score, article)| ScoredArticle { score, article })
            .collect(),
        low_confidence,
    })
}

const NO_DOCS_MESSAGE: &str = "No relevant documents were found for this question.";
const LOW_CONFIDENCE_MESSAGE: &str =
    "Relevance too low to answer confidently; please consult a human.";

/// Format a parsed structured report, mirroring the original collaborator's
/// reply template; missing fields fall back to a placeholder.
fn format_structured_report(title: &str, content: &str, analysis: &Value) -> String {
    let intent_analysis = analysis
        .get("intent_analysis")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let conclusion = analysis
        .get("conclusion")
        .and_then(Value::as_str)
        .unwrap_or("consult a human to confirm");
    let supporting_detail = analysis
        .get("supporting_detail")
        .and_then(Value::as_str)
        .unwrap_or("analysis unavailable");
    let risk_notes = analysis
        .get("risk_notes")
        .and_then(Value::as_array)
        .map(|notes| {
            notes
                .iter()
                .filter_map(Value::as_str)
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    format!(
        "Core reference: {title}\n\nSource text:\n{content}\n\n\
         Intent analysis: {intent_analysis}\n\
         Conclusion: {conclusion}\n\
         Supporting detail: {supporting_detail}\n\n\
         Risk notes:\n{risk_notes}\n"
    )
}

/// Turn a retrieval result into a chat answer: a fixed message when there
/// is nothing to answer from, otherwise a generator call over the
/// retrieved article texts, whose output is parsed as a structured report
/// and falls back to the raw generator text if that parse fails.
pub async fn generate_answer(
    generator: &dyn Generator,
    config: &RetrievalConfig,
    user_text: &str,
    result: &RetrievalResult,
) -> Result<String> {
    if result.articles.is_empty() {
        return Ok(NO_DOCS_MESSAGE.to_string());
    }
    if result.low_confidence {
        return Ok(LOW_CONFIDENCE_MESSAGE.to_string());
    }

    let content = result
        .articles
        .iter()
        .map(|a| a.article.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Answer the user's question using only the context below.\n\nContext:\n{content}\n\nQuestion: {user_text}"
    );
    let sampling = SamplingParams {
        temperature: config.chat_temperature,
        top_p: config.chat_top_p,
        max_tokens: config.chat_max_tokens,
    };
    let raw = generator.generate(&prompt, sampling).await?;

    let analysis = robust_json_parse(&raw);
    let has_fields = matches!(&analysis, Value::Object(map) if !map.is_empty());
    if has_fields {
        let title = result
            .articles
            .iter()
            .map(|a| a.article.title.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format_structured_report(&title, &content, &analysis))
    } else {
        Ok(raw)
    }
}

/// Full `call_rag_flow`: rewrite -> retrieve -> answer, matching the
/// reference collaborator's end-to-end orchestration.
pub async fn call_rag_flow(
    store: &KnowledgeStore,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    config: &RetrievalConfig,
    user_text: &str,
) -> Result<String> {
    let result = retrieve(store, embedder, generator, config, user_text).await?;
    generate_answer(generator, config, user_text, &result).await
}
