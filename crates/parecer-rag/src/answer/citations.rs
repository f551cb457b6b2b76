//! Citation grouping and rendering.

use std::collections::BTreeMap;

use crate::types::{CitationGroup, RetrievedChunk};

/// Group hits by (source, license_type, enterprise_type) and collect the
/// distinct pages each group appeared on, in ascending order. One group per
/// triple, groups ordered by the triple itself so output is deterministic.
pub fn group_citations(hits: &[RetrievedChunk]) -> Vec<CitationGroup> {
    let mut groups: BTreeMap<(String, String, String), Vec<i64>> = BTreeMap::new();

    for hit in hits {
        let key = (
            hit.source.clone(),
            hit.license_type.clone(),
            hit.enterprise_type.clone(),
        );
        let pages = groups.entry(key).or_default();
        if !pages.contains(&hit.page) {
            pages.push(hit.page);
        }
    }

    groups
        .into_iter()
        .map(|((source, license_type, enterprise_type), mut pages)| {
            pages.sort_unstable();
            CitationGroup {
                source,
                license_type,
                enterprise_type,
                pages,
            }
        })
        .collect()
}

/// Render citation groups as bullets, one per document triple.
pub fn format_citations(hits: &[RetrievedChunk]) -> String {
    let groups = group_citations(hits);
    if groups.is_empty() {
        return String::new();
    }

    let mut out = String::from("Fontes:\n");
    for group in &groups {
        let pages: Vec<String> = group.pages.iter().map(|p| p.to_string()).collect();
        let page_label = if group.pages.len() == 1 { "pág." } else { "págs." };
        out.push_str(&format!(
            "- {} ({} / {}), {} {}\n",
            group.source,
            group.license_type,
            group.enterprise_type,
            page_label,
            pages.join(", ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, license: &str, enterprise: &str, page: i64) -> RetrievedChunk {
        RetrievedChunk {
            score: 0.9,
            text: "trecho".to_string(),
            source: source.to_string(),
            page,
            license_type: license.to_string(),
            enterprise_type: enterprise.to_string(),
        }
    }

    #[test]
    fn one_group_per_triple_with_ascending_pages() {
        let hits = vec![
            hit("LO_mineracao_parecer.pdf", "LO", "mineracao", 7),
            hit("LO_mineracao_parecer.pdf", "LO", "mineracao", 3),
            hit("LO_mineracao_parecer.pdf", "LO", "mineracao", 7),
            hit("LP_industria_estudo.pdf", "LP", "industria", 1),
        ];

        let groups = group_citations(&hits);
        assert_eq!(groups.len(), 2);

        let lo = &groups[0];
        assert_eq!(lo.source, "LO_mineracao_parecer.pdf");
        assert_eq!(lo.pages, vec![3, 7]);

        let lp = &groups[1];
        assert_eq!(lp.source, "LP_industria_estudo.pdf");
        assert_eq!(lp.pages, vec![1]);
    }

    #[test]
    fn same_source_different_license_is_a_distinct_group() {
        let hits = vec![
            hit("parecer.pdf", "LI", "mineracao", 2),
            hit("parecer.pdf", "LO", "mineracao", 2),
        ];
        assert_eq!(group_citations(&hits).len(), 2);
    }

    #[test]
    fn pages_are_strictly_ascending_without_duplicates() {
        let hits = vec![
            hit("a.pdf", "LO", "x", 5),
            hit("a.pdf", "LO", "x", 1),
            hit("a.pdf", "LO", "x", 5),
            hit("a.pdf", "LO", "x", 3),
        ];
        let groups = group_citations(&hits);
        assert_eq!(groups[0].pages, vec![1, 3, 5]);
        assert!(groups[0].pages.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn formatting_emits_one_bullet_per_group() {
        let hits = vec![
            hit("a.pdf", "LO", "mineracao", 2),
            hit("b.pdf", "LP", "industria", 4),
        ];
        let text = format_citations(&hits);
        assert!(text.starts_with("Fontes:\n"));
        assert_eq!(text.matches("- ").count(), 2);
        assert!(text.contains("a.pdf (LO / mineracao), pág. 2"));
        assert!(text.contains("b.pdf (LP / industria), pág. 4"));
    }

    #[test]
    fn empty_hits_produce_no_citation_block() {
        assert_eq!(format_citations(&[]), "");
    }
}
