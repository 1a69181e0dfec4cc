use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// Everything outside Hangul, Latin letters, digits and whitespace is noise.
    static ref NON_WORD: Regex = Regex::new(r"[^가-힣a-zA-Z0-9\s]").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let korean: &[&str] = &[
            "이", "그", "저", "것", "의", "가", "을", "를", "에", "에서", "로", "으로",
            "은", "는", "이다", "있다", "하다", "되다", "수", "등", "및", "또는",
            "그리고", "하지만", "그러나", "따라서", "그래서",
        ];
        let english: &[&str] = &[
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from",
            "has", "he", "in", "is", "it", "its", "of", "on", "that", "the",
            "to", "was", "will", "with", "or", "but", "if", "this", "they",
        ];
        korean.iter().chain(english.iter()).copied().collect()
    };
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Tokenize text into normalized terms: NFKC normalization, lowercase,
/// non-word characters stripped, whitespace split, stopwords and
/// sub-2-character fragments dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let cleaned = NON_WORD.replace_all(&normalized, " ");
    cleaned
        .split_whitespace()
        .filter(|token| token.chars().count() >= 2 && !is_stopword(token))
        .map(|token| token.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Quarterly report: budget, budget!");
        assert!(t.iter().any(|w| w == "quarterly"));
        assert!(t.iter().any(|w| w == "budget"));
    }

    #[test]
    fn drops_short_tokens() {
        let t = tokenize("x y report");
        assert_eq!(t, vec!["report".to_string()]);
    }

    #[test]
    fn keeps_korean_terms() {
        let t = tokenize("보고서 초안 v2");
        assert!(t.contains(&"보고서".to_string()));
        assert!(t.contains(&"초안".to_string()));
        assert!(t.contains(&"v2".to_string()));
    }
}
