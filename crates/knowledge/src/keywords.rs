//! Question keyword extraction shared by re-ranking and relevance filtering.
//!
//! Questions are mostly Chinese, so there is no word segmentation: keywords
//! are character windows or runs bounded by stop characters, punctuation and
//! whitespace.

/// Function characters ignored when forming keywords.
pub const STOP_CHARS: [char; 9] = ['的', '有', '几', '条', '是', '在', '和', '或', '与'];

/// Interrogative words removed before core-keyword extraction.
pub const STOP_WORDS: [&str; 4] = ["什么", "怎么", "如何", "哪些"];

/// Punctuation that separates keywords.
pub const PUNCTUATION: [char; 10] = ['？', '?', '：', ':', '，', ',', '。', '.', '！', '!'];

const MIN_PHRASE_CHARS: usize = 2;
const MAX_PHRASE_CHARS: usize = 4;

pub fn is_stop_char(c: char) -> bool {
    STOP_CHARS.contains(&c)
}

/// Characters that end a keyword run.
pub fn is_breaker(c: char) -> bool {
    is_stop_char(c) || PUNCTUATION.contains(&c) || c.is_whitespace()
}

/// Lowercase and trim, the form every comparison uses.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Remove all whitespace.
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Every 2 to 4 character window of the question that contains no breaker.
///
/// Duplicates are dropped, first occurrence wins.
pub fn ranking_phrases(question: &str) -> Vec<String> {
    let chars: Vec<char> = normalize(question).chars().collect();
    let mut phrases: Vec<String> = Vec::new();

    for start in 0..chars.len() {
        for len in MIN_PHRASE_CHARS..=MAX_PHRASE_CHARS {
            let end = start + len;
            if end > chars.len() {
                break;
            }
            let window = &chars[start..end];
            // Longer windows from the same start only add more breakers.
            if window.iter().any(|&c| is_breaker(c)) {
                break;
            }
            let phrase: String = window.iter().collect();
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
        }
    }

    phrases
}

/// The question with every breaker removed, e.g. "培训要求有几条" -> "培训要求".
pub fn strip_stop_chars(question: &str) -> String {
    normalize(question)
        .chars()
        .filter(|&c| !is_breaker(c))
        .collect()
}

/// Maximal runs of at least two non-breaker characters, after removing
/// interrogative words.
pub fn core_keywords(question: &str) -> Vec<String> {
    let mut text = normalize(question);
    for word in STOP_WORDS {
        text = text.replace(word, " ");
    }

    let mut keywords: Vec<String> = Vec::new();
    for run in text.split(is_breaker) {
        if run.chars().count() >= MIN_PHRASE_CHARS && !keywords.iter().any(|k| k == run) {
            keywords.push(run.to_string());
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_phrases_skip_stop_chars() {
        let phrases = ranking_phrases("培训要求有几条");
        assert_eq!(
            phrases,
            vec!["培训", "培训要", "培训要求", "训要", "训要求", "要求"]
        );
    }

    #[test]
    fn test_ranking_phrases_break_on_punctuation_and_space() {
        let phrases = ranking_phrases("验收 标准？");
        assert_eq!(phrases, vec!["验收", "标准"]);
    }

    #[test]
    fn test_ranking_phrases_dedupes() {
        let phrases = ranking_phrases("安全安全");
        assert_eq!(phrases, vec!["安全", "安全安", "安全安全", "全安", "全安全"]);
    }

    #[test]
    fn test_ranking_phrases_lowercase_ascii() {
        let phrases = ranking_phrases("API");
        assert!(phrases.contains(&"api".to_string()));
    }

    #[test]
    fn test_single_character_question_has_no_phrases() {
        assert!(ranking_phrases("是").is_empty());
        assert!(ranking_phrases("").is_empty());
    }

    #[test]
    fn test_strip_stop_chars() {
        assert_eq!(strip_stop_chars("培训要求有几条"), "培训要求");
        assert_eq!(strip_stop_chars("验收 标准？"), "验收标准");
    }

    #[test]
    fn test_core_keywords_runs() {
        assert_eq!(core_keywords("培训要求有几条"), vec!["培训要求"]);
        assert_eq!(
            core_keywords("什么是项目验收标准，如何申请？"),
            vec!["项目验收标准", "申请"]
        );
    }

    #[test]
    fn test_core_keywords_drop_single_chars() {
        assert!(core_keywords("是什么？").is_empty());
        assert!(core_keywords("a的b").is_empty());
    }
}
