//! Detects which prompt passages the generated answer cites.

use kbqa_prompt::CITATION_MARKERS;
use std::collections::BTreeMap;

/// Map every representable passage index to whether its marker appears in
/// `answer`.
///
/// Indices are 1-based and cover `1..=min(passage_count, 10)`. Passages past
/// the marker alphabet can never be reported as used.
pub fn extract_used_indices(answer: &str, passage_count: usize) -> BTreeMap<usize, bool> {
    CITATION_MARKERS
        .iter()
        .take(passage_count)
        .enumerate()
        .map(|(i, marker)| (i + 1, answer.contains(*marker)))
        .collect()
}

/// Indices marked as used, ascending.
pub fn used(indices: &BTreeMap<usize, bool>) -> Vec<usize> {
    indices
        .iter()
        .filter_map(|(&index, &used)| used.then_some(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_prompt::citation_marker;

    #[test]
    fn test_first_and_third_cited() {
        let indices = extract_used_indices("培训不少于3天①。考核合格后发证③。", 3);
        assert_eq!(
            indices,
            BTreeMap::from([(1, true), (2, false), (3, true)])
        );
        assert_eq!(used(&indices), vec![1, 3]);
    }

    #[test]
    fn test_adding_marker_adds_exactly_that_index() {
        let base = "答案①③";
        for k in 1..=10 {
            let before = extract_used_indices(base, 10);
            let after = extract_used_indices(&format!("{}{}", base, citation_marker(k)), 10);
            for i in 1..=10 {
                if i == k {
                    assert!(after[&i]);
                } else {
                    assert_eq!(before[&i], after[&i]);
                }
            }
        }
    }

    #[test]
    fn test_repeated_marker_counts_once() {
        let indices = extract_used_indices("②②②", 2);
        assert_eq!(used(&indices), vec![2]);
    }

    #[test]
    fn test_markers_beyond_passage_count_ignored() {
        let indices = extract_used_indices("①⑤", 3);
        assert_eq!(indices.len(), 3);
        assert_eq!(used(&indices), vec![1]);
    }

    #[test]
    fn test_parenthesized_fallback_not_recognised() {
        let indices = extract_used_indices("见(11)与(12)", 12);
        assert_eq!(indices.len(), 10);
        assert!(used(&indices).is_empty());
    }

    #[test]
    fn test_no_markers() {
        let indices = extract_used_indices("根据提供的上下文，我无法找到相关信息", 4);
        assert!(used(&indices).is_empty());
    }
}
