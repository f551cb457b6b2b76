//! Extractive answering: pick the sentences of the retrieved context most
//! similar to the query under a TF-IDF bag-of-words model. Every emitted
//! sentence is verbatim text from a retrieved chunk.

use std::collections::HashMap;

use crate::types::RetrievedChunk;

pub const NO_ANSWER_MESSAGE: &str =
    "Não foi possível localizar trechos relevantes nos documentos indexados.";

/// Build an extractive answer from the hits: top `max_sentences` distinct
/// sentences ranked by TF-IDF cosine similarity to the query, one bullet each.
pub fn extractive_answer(query: &str, hits: &[RetrievedChunk], max_sentences: usize) -> String {
    let sentences = rank_sentences(query, hits, max_sentences);
    if sentences.is_empty() {
        return NO_ANSWER_MESSAGE.to_string();
    }

    let mut out = String::new();
    for sentence in &sentences {
        out.push_str("- ");
        out.push_str(sentence);
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// The ranked sentences themselves, highest similarity first.
pub fn rank_sentences(query: &str, hits: &[RetrievedChunk], max_sentences: usize) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    for hit in hits {
        for sentence in split_sentences(&hit.text) {
            if !sentences.contains(&sentence) {
                sentences.push(sentence);
            }
        }
    }
    if sentences.is_empty() || max_sentences == 0 {
        return Vec::new();
    }

    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let sentence_terms: Vec<Vec<String>> = sentences.iter().map(|s| tokenize(s)).collect();
    let idf = inverse_document_frequencies(&sentence_terms);

    let query_vec = tfidf_vector(&query_terms, &idf);
    let mut scored: Vec<(usize, f64)> = sentence_terms
        .iter()
        .enumerate()
        .map(|(i, terms)| (i, cosine(&query_vec, &tfidf_vector(terms, &idf))))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    // Stable by original position, so ties keep document order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_sentences);

    scored
        .into_iter()
        .map(|(i, _)| sentences[i].clone())
        .collect()
}

/// Split on sentence-final punctuation and hard line breaks. Short fragments
/// (stray numbering, page furniture) are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    const MIN_SENTENCE_CHARS: usize = 20;

    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch == '\n' {
            flush_sentence(&mut current, &mut sentences, MIN_SENTENCE_CHARS);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            flush_sentence(&mut current, &mut sentences, MIN_SENTENCE_CHARS);
        }
    }
    flush_sentence(&mut current, &mut sentences, MIN_SENTENCE_CHARS);
    sentences
}

fn flush_sentence(current: &mut String, out: &mut Vec<String>, min_chars: usize) {
    let trimmed = current.trim();
    if trimmed.chars().count() >= min_chars {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn inverse_document_frequencies(docs: &[Vec<String>]) -> HashMap<String, f64> {
    let n = docs.len() as f64;
    let mut df: HashMap<String, usize> = HashMap::new();
    for doc in docs {
        let mut seen: Vec<&String> = Vec::new();
        for term in doc {
            if !seen.contains(&term) {
                seen.push(term);
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
    }
    df.into_iter()
        .map(|(term, count)| (term, (n / (1.0 + count as f64)).ln() + 1.0))
        .collect()
}

fn tfidf_vector(terms: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut tf: HashMap<String, f64> = HashMap::new();
    for term in terms {
        *tf.entry(term.clone()).or_insert(0.0) += 1.0;
    }
    // Query terms absent from the corpus get a neutral idf of 1.0.
    tf.into_iter()
        .map(|(term, count)| {
            let weight = count * idf.get(&term).copied().unwrap_or(1.0);
            (term, weight)
        })
        .collect()
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            score: 0.8,
            text: text.to_string(),
            source: "LO_mineracao_parecer.pdf".to_string(),
            page: 1,
            license_type: "LO".to_string(),
            enterprise_type: "mineracao".to_string(),
        }
    }

    #[test]
    fn selected_sentences_are_verbatim_from_context() {
        let hits = vec![
            hit("A licença de operação tem validade de quatro anos. \
                 O monitoramento da qualidade da água deve ser semestral."),
            hit("O empreendedor deverá apresentar relatório anual de condicionantes."),
        ];
        let context: String = hits.iter().map(|h| h.text.as_str()).collect::<Vec<_>>().join(" ");

        let sentences = rank_sentences("Qual a validade da licença de operação?", &hits, 3);
        assert!(!sentences.is_empty());
        for sentence in &sentences {
            assert!(context.contains(sentence), "not verbatim: {sentence}");
        }
    }

    #[test]
    fn most_relevant_sentence_ranks_first() {
        let hits = vec![hit(
            "A licença de operação tem validade de quatro anos. \
             O canteiro de obras deve ser sinalizado conforme norma municipal.",
        )];
        let sentences = rank_sentences("validade da licença de operação", &hits, 2);
        assert!(sentences[0].contains("validade de quatro anos"));
    }

    #[test]
    fn respects_sentence_budget() {
        let text = "A condicionante um trata de emissões atmosféricas industriais. \
                    A condicionante dois trata de emissões de ruído noturno. \
                    A condicionante três trata de emissões de efluentes líquidos.";
        let sentences = rank_sentences("condicionante emissões", &[hit(text)], 2);
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn no_overlap_returns_fallback_message() {
        let hits = vec![hit("O zoneamento municipal define os usos permitidos do solo.")];
        let answer = extractive_answer("xyzzy plugh", &hits, 5);
        assert_eq!(answer, NO_ANSWER_MESSAGE);
    }

    #[test]
    fn empty_hits_return_fallback_message() {
        assert_eq!(extractive_answer("qualquer pergunta", &[], 5), NO_ANSWER_MESSAGE);
    }

    #[test]
    fn duplicate_sentences_across_chunks_emitted_once() {
        let repeated = "O monitoramento da qualidade do ar deve ser contínuo na planta.";
        let hits = vec![hit(repeated), hit(repeated)];
        let sentences = rank_sentences("monitoramento qualidade do ar", &hits, 5);
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn splitter_drops_short_fragments() {
        let sentences = split_sentences("1.\n2.\nEsta frase tem comprimento suficiente para contar.");
        assert_eq!(sentences.len(), 1);
    }
}
