//! TF-IDF term weighting over the idea corpus.
//!
//! Tokens are lowercased runs of two or more word characters. English stop words are
//! dropped, the vocabulary keeps the `max_features` most frequent terms, idf is smoothed as
//! `ln((1 + n) / (1 + df)) + 1`, and each document row is L2-normalized. The fitted table is
//! never mutated, so it can be shared behind an `Arc` by concurrent keyword lookups.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// English stop words.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything",
    "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
    "become", "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below",
    "beside", "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call",
    "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail",
    "do", "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Split text into lowercase tokens, stop words removed.
pub fn tokenize(text: &str, stop_words: &HashSet<&str>) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !stop_words.contains(t))
        .map(str::to_string)
        .collect()
}

/// A fitted TF-IDF table: one sparse, L2-normalized row per document.
#[derive(Debug, Clone)]
pub struct TfIdfMatrix {
    terms: Vec<String>,
    rows: Vec<Vec<(usize, f64)>>,
}

impl TfIdfMatrix {
    /// Fit the table over `documents`, keeping at most `max_features` terms.
    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Self {
        let stop_words: HashSet<&str> = ENGLISH_STOP_WORDS.iter().copied().collect();
        let tokenized: Vec<Vec<String>> =
            documents.iter().map(|d| tokenize(d.as_ref(), &stop_words)).collect();

        let mut corpus_counts: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            for token in tokens {
                *corpus_counts.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut terms: Vec<String> = ranked.into_iter().map(|(t, _)| t.to_string()).collect();
        terms.sort();
        let index: HashMap<&str, usize> =
            terms.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();

        let n = documents.len() as f64;
        let mut doc_freq = vec![0usize; terms.len()];
        let counts: Vec<BTreeMap<usize, usize>> = tokenized
            .iter()
            .map(|tokens| {
                let mut row = BTreeMap::new();
                for token in tokens {
                    if let Some(&i) = index.get(token.as_str()) {
                        *row.entry(i).or_insert(0) += 1;
                    }
                }
                for &i in row.keys() {
                    doc_freq[i] += 1;
                }
                row
            })
            .collect();

        let idf: Vec<f64> =
            doc_freq.iter().map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0).collect();

        let rows = counts
            .into_iter()
            .map(|row| {
                let mut weighted: Vec<(usize, f64)> =
                    row.into_iter().map(|(i, tf)| (i, tf as f64 * idf[i])).collect();
                let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, w) in &mut weighted {
                        *w /= norm;
                    }
                }
                weighted
            })
            .collect();

        Self { terms, rows }
    }

    /// Vocabulary, sorted.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no documents.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Top `top_n` terms by mean score across `documents` (row positions).
    ///
    /// Ties are broken by term ascending; zero-score terms are never returned.
    pub fn top_terms(&self, documents: &[usize], top_n: usize) -> Vec<(String, f64)> {
        if documents.is_empty() {
            return Vec::new();
        }
        let mut sums = vec![0.0f64; self.terms.len()];
        for &d in documents {
            if let Some(row) = self.rows.get(d) {
                for &(i, w) in row {
                    sums[i] += w;
                }
            }
        }
        let count = documents.len() as f64;
        let mut scored: Vec<(usize, f64)> = sums
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .map(|(i, s)| (i, s / count))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_n);
        scored.into_iter().map(|(i, s)| (self.terms[i].clone(), s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_drops_stop_words_and_short_tokens() {
        let stop: HashSet<&str> = ENGLISH_STOP_WORDS.iter().copied().collect();
        assert_eq!(tokenize("The Cafeteria is a mess, a 5 star FIX!", &stop), vec![
            "cafeteria", "mess", "star", "fix"
        ]);
    }

    #[test]
    fn rows_are_unit_length() {
        let matrix = TfIdfMatrix::fit(&["parking lot lights", "parking shuttle bus"], 100);
        for d in 0..matrix.len() {
            let top = matrix.top_terms(&[d], 10);
            let norm: f64 = top.iter().map(|(_, s)| s * s).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn vocabulary_is_capped_by_frequency() {
        let matrix = TfIdfMatrix::fit(&["coffee coffee tea", "coffee water"], 1);
        assert_eq!(matrix.terms(), &["coffee".to_string()]);
    }

    #[test]
    fn rare_terms_outrank_common_ones() {
        let docs = ["parking shuttle", "parking lights", "parking permits"];
        let matrix = TfIdfMatrix::fit(&docs, 100);
        let top = matrix.top_terms(&[0], 2);
        assert_eq!(top[0].0, "shuttle");
        assert_eq!(top[1].0, "parking");
    }

    #[test]
    fn cluster_keywords_average_member_rows() {
        let docs = ["badge printer broken", "printer toner empty", "gym hours"];
        let matrix = TfIdfMatrix::fit(&docs, 100);
        let top = matrix.top_terms(&[0, 1], 3);
        assert_eq!(top[0].0, "printer");
        assert!(top.iter().all(|(t, _)| t != "gym"));
    }
}
