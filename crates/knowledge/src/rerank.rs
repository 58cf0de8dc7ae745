//! Lexical re-ranking of over-fetched candidates.
//!
//! Vector search over-recalls near-miss text, so candidates are re-scored by
//! how much of the question they contain verbatim. The original vector rank
//! is subtracted from the score as a tie-break.

use crate::keywords::{normalize, ranking_phrases, strip_stop_chars, strip_whitespace};
use crate::types::{Passage, ScoredPassage};

const FULL_QUESTION_SCORE: i64 = 100;
const STRIPPED_QUESTION_SCORE: i64 = 80;
const KEYWORD_SCORE: i64 = 20;
const LEADING_KEYWORD_BONUS: i64 = 10;
const ALL_KEYWORDS_BONUS: i64 = 50;

/// Question terms used for scoring, computed once per question.
#[derive(Debug, Clone)]
struct QuestionTerms {
    full: String,
    stripped: String,
    keywords: Vec<String>,
}

impl QuestionTerms {
    fn new(question: &str) -> Self {
        let full = normalize(question);
        let mut keywords = ranking_phrases(question);
        if keywords.is_empty() && !full.is_empty() {
            keywords.push(full.clone());
        }
        Self {
            stripped: strip_stop_chars(question),
            full,
            keywords,
        }
    }

    fn score(&self, text: &str) -> i64 {
        let content = normalize(text);
        let compact = strip_whitespace(&content);
        let mut score = 0;

        if !self.full.is_empty() && content.contains(&self.full) {
            score += FULL_QUESTION_SCORE;
        }
        if !self.stripped.is_empty()
            && (content.contains(&self.stripped) || compact.contains(&self.stripped))
        {
            score += STRIPPED_QUESTION_SCORE;
        }

        let mut matched = 0;
        for keyword in &self.keywords {
            // Text extracted from documents often splits phrases with spaces
            if !content.contains(keyword.as_str()) && !compact.contains(keyword.as_str()) {
                continue;
            }
            matched += 1;
            score += KEYWORD_SCORE;
            if content.starts_with(keyword.as_str()) || content.contains(&format!("{} ", keyword)) {
                score += LEADING_KEYWORD_BONUS;
            }
        }

        if matched > 0 && matched == self.keywords.len() {
            score += ALL_KEYWORDS_BONUS;
        }

        score
    }
}

/// Score every candidate and sort by descending score.
///
/// The sort is stable, so equal scores keep their original order.
pub fn score_candidates(question: &str, candidates: Vec<Passage>) -> Vec<ScoredPassage> {
    let terms = QuestionTerms::new(question);
    tracing::debug!("Re-ranking with keywords {:?}", terms.keywords);

    let mut scored: Vec<ScoredPassage> = candidates
        .into_iter()
        .enumerate()
        .map(|(original_index, passage)| ScoredPassage {
            score: terms.score(&passage.text) - original_index as i64,
            passage,
            original_index,
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}

/// Re-rank `candidates` and keep at most `k`.
///
/// Returns the input unchanged when it already has `k` or fewer passages.
/// Only positively scored passages are kept; when none qualify the first `k`
/// candidates in their original order are returned instead.
pub fn rerank(question: &str, candidates: Vec<Passage>, k: usize) -> Vec<Passage> {
    if candidates.len() <= k {
        return candidates;
    }

    let fallback: Vec<Passage> = candidates.iter().take(k).cloned().collect();
    let selected: Vec<Passage> = score_candidates(question, candidates)
        .into_iter()
        .filter(|s| s.raw_score() > 0)
        .take(k)
        .map(|s| s.passage)
        .collect();

    if selected.is_empty() {
        tracing::debug!("No candidate matched the question lexically, keeping vector order");
        return fallback;
    }

    tracing::debug!("Re-ranking kept {} of the candidates", selected.len());
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(texts: &[&str]) -> Vec<Passage> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Passage::new(*t).with_rank(i))
            .collect()
    }

    fn texts(passages: &[Passage]) -> Vec<&str> {
        passages.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_small_input_is_noop() {
        let input = candidates(&["无关", "其他", "培训要求"]);
        let output = rerank("培训要求有几条", input.clone(), 3);
        assert_eq!(output, input);

        let output = rerank("培训要求有几条", input.clone(), 5);
        assert_eq!(output, input);
    }

    #[test]
    fn test_verbatim_matches_rank_first_then_tie_break() {
        let mut pool: Vec<String> = (0..20).map(|i| format!("无关段落{}", i)).collect();
        pool[2] = "考核要求按季度执行".to_string();
        pool[5] = "第一章 培训要求共三条".to_string();
        pool[7] = "人员要求详见附件".to_string();
        pool[12] = "本办法所称培训要求如下".to_string();
        let refs: Vec<&str> = pool.iter().map(String::as_str).collect();

        let output = rerank("培训要求有几条", candidates(&refs), 3);
        assert_eq!(output.len(), 3);

        // Both verbatim matches first, in vector order
        assert_eq!(output[0].original_rank, 5);
        assert_eq!(output[1].original_rank, 12);
        // Two partial matches on "要求" tie on raw score; the earlier one wins
        assert_eq!(output[2].original_rank, 2);
    }

    #[test]
    fn test_full_match_beats_zero_match() {
        let mut pool: Vec<String> = (0..30).map(|i| format!("段落{}", i)).collect();
        pool[29] = "项目验收标准包括以下内容".to_string();
        let refs: Vec<&str> = pool.iter().map(String::as_str).collect();

        let scored = score_candidates("验收标准", candidates(&refs));
        let full = scored.iter().find(|s| s.original_index == 29).unwrap();
        for other in scored.iter().filter(|s| s.original_index != 29) {
            assert!(full.score > other.score);
        }
    }

    #[test]
    fn test_no_match_falls_back_to_vector_order() {
        let input = candidates(&["甲", "乙", "丙", "丁", "戊"]);
        let output = rerank("培训要求", input, 2);
        assert_eq!(texts(&output), vec!["甲", "乙"]);
    }

    #[test]
    fn test_only_positive_scores_kept() {
        let input = candidates(&["无关", "安全生产责任", "其他", "再其他", "更多"]);
        let output = rerank("安全生产", input, 3);
        assert_eq!(texts(&output), vec!["安全生产责任"]);
    }

    #[test]
    fn test_question_without_phrases_uses_whole_question() {
        let input = candidates(&["a", "b", "包含的内容", "c"]);
        let scored = score_candidates("的", input);
        assert_eq!(scored[0].passage.text, "包含的内容");
        assert!(scored[0].raw_score() > 0);
    }

    #[test]
    fn test_leading_keyword_bonus() {
        let terms = QuestionTerms::new("预算");
        // full +100, stripped +80, keyword +20, leading +10, all +50
        assert_eq!(terms.score("预算编制说明"), 260);
        assert_eq!(terms.score("年度预算编制说明"), 250);
        assert_eq!(terms.score("年度预算 编制说明"), 260);
    }

    #[test]
    fn test_keywords_match_across_spaces() {
        let terms = QuestionTerms::new("培训要求");
        assert_eq!(terms.score("培训要求共三条"), 380);
        // stripped +80, six keywords +120, leading "培训" +10, all +50
        assert_eq!(terms.score("培训 要求共三条"), 260);
    }

    #[test]
    fn test_stripped_question_matches_across_spaces() {
        let terms = QuestionTerms::new("验收 标准");
        assert!(terms.score("验收标准") >= STRIPPED_QUESTION_SCORE);
    }
}
