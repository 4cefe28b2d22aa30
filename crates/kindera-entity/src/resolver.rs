// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexical entity resolution: maps natural-language nouns onto the static
//! catalogue. Pure function, no I/O, never fails; an empty result signals
//! the caller to fall back to a generic tool.

use crate::catalog::{EntityDescriptor, CATALOG};

/// A catalogue entity recognized in a piece of text.
#[derive(Debug, Clone)]
pub struct EntityMatch {
    pub descriptor: &'static EntityDescriptor,
    /// 0.0-1.0, longer surface matches score higher.
    pub confidence: f32,
    /// The surface text that matched.
    pub matched: String,
}

/// Resolve entity mentions in `text` against the catalogue.
///
/// Chinese synonyms match by substring; English synonyms match on
/// whitespace-delimited words with plural/singular normalization. Each
/// entity appears at most once, carrying its best match; results are
/// sorted by confidence descending.
pub fn resolve(text: &str) -> Vec<EntityMatch> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    let mut matches: Vec<EntityMatch> = Vec::new();

    for descriptor in CATALOG {
        let mut best: Option<EntityMatch> = None;

        for synonym in descriptor.synonyms {
            let found = if synonym.is_ascii() {
                match_english(&words, &lower, synonym)
            } else {
                lower.contains(synonym).then(|| (*synonym).to_string())
            };

            if let Some(surface) = found {
                let confidence = score(&surface, synonym.is_ascii());
                let better = best
                    .as_ref()
                    .map(|b| confidence > b.confidence)
                    .unwrap_or(true);
                if better {
                    best = Some(EntityMatch {
                        descriptor,
                        confidence,
                        matched: surface,
                    });
                }
            }
        }

        if let Some(m) = best {
            matches.push(m);
        }
    }

    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

/// Match an English synonym against the tokenized text, accepting plural
/// forms ("students" matches synonym "student" and vice versa).
fn match_english(words: &[&str], lower_text: &str, synonym: &str) -> Option<String> {
    // Multi-word synonyms ("follow up") match as a phrase.
    if synonym.contains(' ') {
        return lower_text.contains(synonym).then(|| synonym.to_string());
    }

    let singular_synonym = singularize(synonym);
    for word in words {
        if *word == synonym || singularize(word) == singular_synonym {
            return Some((*word).to_string());
        }
    }
    None
}

/// Crude English singularization, enough for catalogue nouns.
fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if let Some(stem) = word.strip_suffix("es")
        && (stem.ends_with("ss") || stem.ends_with('x') || stem.ends_with("ch") || stem.ends_with("sh"))
    {
        return stem.to_string();
    }
    if let Some(stem) = word.strip_suffix('s')
        && !word.ends_with("ss")
    {
        return stem.to_string();
    }
    word.to_string()
}

/// Confidence from surface length. Longer, more specific surfaces
/// (e.g. "入园申请") beat single-character matches (e.g. "班").
fn score(surface: &str, ascii: bool) -> f32 {
    let chars = surface.chars().count() as f32;
    let base = if ascii { 0.55 } else { 0.60 };
    (base + chars * 0.08).min(0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_chinese_student_mention() {
        let matches = resolve("查询所有学生信息");
        assert!(!matches.is_empty());
        assert_eq!(matches[0].descriptor.name, "students");
        assert_eq!(matches[0].matched, "学生");
    }

    #[test]
    fn resolves_english_plural() {
        let matches = resolve("show me all the teachers please");
        assert_eq!(matches[0].descriptor.name, "teachers");
        assert_eq!(matches[0].matched, "teachers");
    }

    #[test]
    fn resolves_english_singular_against_plural_synonym() {
        let matches = resolve("create a new class");
        assert!(matches.iter().any(|m| m.descriptor.name == "classes"));
    }

    #[test]
    fn longer_surface_outranks_shorter() {
        // "入园申请" (enrollment application) and "班" (class) both present;
        // the more specific mention ranks first.
        let matches = resolve("查看小班的入园申请");
        assert!(matches.len() >= 2);
        assert_eq!(matches[0].descriptor.name, "enrollment_applications");
    }

    #[test]
    fn unknown_text_yields_empty() {
        assert!(resolve("今天天气怎么样").is_empty());
        assert!(resolve("what is the meaning of life").is_empty());
    }

    #[test]
    fn each_entity_appears_once() {
        let matches = resolve("学生 学生 student students");
        let student_matches = matches
            .iter()
            .filter(|m| m.descriptor.name == "students")
            .count();
        assert_eq!(student_matches, 1);
    }

    #[test]
    fn singularize_rules() {
        assert_eq!(singularize("students"), "student");
        assert_eq!(singularize("classes"), "class");
        assert_eq!(singularize("activities"), "activity");
        assert_eq!(singularize("staff"), "staff");
        assert_eq!(singularize("class"), "class");
    }

    #[test]
    fn multi_word_synonym_matches_phrase() {
        let matches = resolve("log a follow up for that lead");
        assert!(matches.iter().any(|m| m.descriptor.name == "follow_ups"));
    }
}
