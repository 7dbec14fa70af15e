use crate::error::{GenerationError, GenerationResult};
use crate::llm::client::truncate_str;
use crate::question::QuestionRecord;
use crate::verdict::{Criterion, CriterionVerdict, Verdict};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Strip a surrounding markdown code fence.
///
/// Only the fence delimiters are removed: the leading ```` ```json ```` (or bare
/// ```` ``` ````) marker and a trailing ```` ``` ````. Text that does not start
/// with a fence is returned trimmed and otherwise untouched.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix(JSON_FENCE) {
        rest
    } else if let Some(rest) = trimmed.strip_prefix(FENCE) {
        rest
    } else {
        return trimmed;
    };
    inner.strip_suffix(FENCE).unwrap_or(inner)
}

/// Extract a JSON fragment between matching delimiters
fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses
fn fix_json_issues(json: &str) -> String {
    // Remove trailing commas before ] or }
    let mut fixed = json.to_string();
    if let Ok(re) = Regex::new(r",\s*([}\]])") {
        fixed = re.replace_all(&fixed, "$1").into_owned();
    }

    // Remove any control characters that might have slipped in
    fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Replace smart double quotes that stand where JSON expects a delimiter.
/// Quotes inside string values are left alone.
fn fix_structural_quotes(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let is_smart = |c: char| c == '\u{201C}' || c == '\u{201D}';

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if !is_smart(c) {
                return c;
            }
            let before = chars[..i].iter().rev().copied().find(|c| !c.is_whitespace());
            let after = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
            let opens = matches!(before, Some('{' | '[' | ',' | ':'));
            let closes = matches!(after, Some(':' | ',' | '}' | ']'));
            if opens || closes {
                '"'
            } else {
                c
            }
        })
        .collect()
}

/// Strict parse of the unfenced text, then lenient passes over the
/// outermost `{...}` fragment with light repairs.
fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let clean = strip_code_fence(raw);
    let strict_error = match serde_json::from_str::<T>(clean) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    if let Some(fragment) = extract_json_fragment(clean, '{', '}') {
        let repaired = fix_json_issues(fragment);
        if let Ok(parsed) = serde_json::from_str::<T>(&repaired) {
            return Ok(parsed);
        }
        if let Ok(parsed) = serde_json::from_str::<T>(&fix_structural_quotes(&repaired)) {
            return Ok(parsed);
        }
    }

    Err(format!(
        "{} (response preview: {})",
        strict_error,
        truncate_str(clean, 200)
    ))
}

/// Content extractor: raw generator text to a question record
pub fn extract_question(raw: &str) -> GenerationResult<QuestionRecord> {
    parse_lenient::<QuestionRecord>(raw).map_err(GenerationError::MalformedContent)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VerdictWire {
    /// `{"valid":..,"1":{"uniqueness":..},"2":{"answer":..}}`
    Numbered {
        valid: bool,
        #[serde(rename = "1")]
        uniqueness: LegacyUniqueness,
        #[serde(rename = "2")]
        answer: LegacyAnswer,
    },
    Named {
        valid: bool,
        uniqueness: CriterionVerdict,
        #[serde(alias = "answer-correctness", alias = "answer")]
        answer_correctness: CriterionVerdict,
    },
}

#[derive(Deserialize)]
struct LegacyUniqueness {
    uniqueness: bool,
    #[serde(default)]
    uniqueness_issues: String,
}

#[derive(Deserialize)]
struct LegacyAnswer {
    answer: bool,
    #[serde(default)]
    answer_issues: String,
}

impl From<VerdictWire> for Verdict {
    fn from(wire: VerdictWire) -> Self {
        match wire {
            VerdictWire::Numbered {
                valid,
                uniqueness,
                answer,
            } => Verdict::new(
                valid,
                BTreeMap::from([
                    (
                        Criterion::Uniqueness,
                        CriterionVerdict {
                            passed: uniqueness.uniqueness,
                            issues: uniqueness.uniqueness_issues,
                        },
                    ),
                    (
                        Criterion::AnswerCorrectness,
                        CriterionVerdict {
                            passed: answer.answer,
                            issues: answer.answer_issues,
                        },
                    ),
                ]),
            ),
            VerdictWire::Named {
                valid,
                uniqueness,
                answer_correctness,
            } => Verdict::new(
                valid,
                BTreeMap::from([
                    (Criterion::Uniqueness, uniqueness),
                    (Criterion::AnswerCorrectness, answer_correctness),
                ]),
            ),
        }
    }
}

/// Parse a judge response. Both criteria are required.
pub fn parse_verdict(raw: &str) -> GenerationResult<Verdict> {
    parse_lenient::<VerdictWire>(raw)
        .map(Verdict::from)
        .map_err(GenerationError::EvaluationFault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::OptionLabel;

    const RECORD: &str = r#"{"question":"A 2 kg cart moves at 2 m/s. What is its kinetic energy?","skill":"Apply","options":{"a":"2 J","b":"4 J","c":"8 J","d":"16 J"},"correct_answer":"b","topic":"work-energy theorem"}"#;

    #[test]
    fn test_strip_code_fence_json_marker() {
        let fenced = format!("```json\n{}\n```", RECORD);
        assert_eq!(strip_code_fence(&fenced).trim(), RECORD);
    }

    #[test]
    fn test_strip_code_fence_bare_marker() {
        let fenced = format!("```\n{}\n```", RECORD);
        assert_eq!(strip_code_fence(&fenced).trim(), RECORD);
    }

    #[test]
    fn test_strip_code_fence_leaves_inner_backticks() {
        // Only the delimiters go; inner text is not trimmed of anything else
        let fenced = "```json\n{\"question\":\"use `F = ma`\"}\n```";
        assert_eq!(
            strip_code_fence(fenced),
            "\n{\"question\":\"use `F = ma`\"}\n"
        );
        assert_eq!(strip_code_fence("  plain text  "), "plain text");
    }

    #[test]
    fn test_extraction_is_idempotent_under_fencing() {
        let plain = extract_question(RECORD).unwrap();
        let fenced = extract_question(&format!("```json\n{}\n```", RECORD)).unwrap();
        let bare = extract_question(&format!("```{}```", RECORD)).unwrap();
        assert_eq!(plain, fenced);
        assert_eq!(plain, bare);
        assert_eq!(plain.answer_label(), Some(OptionLabel::B));
    }

    #[test]
    fn test_extract_repairs_trailing_comma_and_prose() {
        let noisy = "Here is your question:\n{\"question\":\"Q?\",\"options\":{\"a\":\"1\",\"b\":\"2\",\"c\":\"3\",\"d\":\"4\",},\"correct_answer\":\"c\",}";
        let record = extract_question(noisy).unwrap();
        assert_eq!(record.correct_answer, "c");
        assert!(record.skill.is_empty());
    }

    #[test]
    fn test_extract_keeps_smart_quotes_inside_values() {
        let noisy = "{\"question\":\"Which statement of \u{201C}work\u{201D} is right?\",\"options\":{\"a\":\"1\",\"b\":\"2\",\"c\":\"3\",\"d\":\"4\",},\"correct_answer\":\"a\"}";
        let record = extract_question(noisy).unwrap();
        assert_eq!(record.question, "Which statement of \u{201C}work\u{201D} is right?");
        assert_eq!(record.correct_answer, "a");
    }

    #[test]
    fn test_extract_repairs_smart_quote_delimiters() {
        let noisy = "{\u{201C}question\u{201D}: \u{201C}Define \u{201C}power\u{201D} here\u{201D}, \"options\":{\"a\":\"1\",\"b\":\"2\",\"c\":\"3\",\"d\":\"4\"},\"correct_answer\":\"d\"}";
        let record = extract_question(noisy).unwrap();
        assert_eq!(record.question, "Define \u{201C}power\u{201D} here");
        assert_eq!(record.correct_answer, "d");
    }

    #[test]
    fn test_extract_malformed_is_error() {
        let err = extract_question("```json\n{\"question\": \"unterminated\n```").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedContent(_)));

        // Structurally valid JSON that lacks required fields is also malformed
        let err = extract_question(r#"{"question":"Q?"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedContent(_)));
    }

    #[test]
    fn test_parse_verdict_named_shape() {
        let raw = r#"```json
{"valid": false, "uniqueness": {"passed": false, "issues": "same as question 1"}, "answer_correctness": {"passed": true, "issues": ""}}
```"#;
        let verdict = parse_verdict(raw).unwrap();
        assert!(!verdict.valid);
        assert!(verdict.uniqueness_failed());
        assert!(verdict.passed(Criterion::AnswerCorrectness));
    }

    #[test]
    fn test_parse_verdict_numbered_shape() {
        let raw = r#"{"valid": true, "1": {"uniqueness": true, "uniqueness_issues": ""}, "2": {"answer": true, "answer_issues": ""}}"#;
        let verdict = parse_verdict(raw).unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.criteria.len(), 2);
    }

    #[test]
    fn test_parse_verdict_missing_criterion_is_fault() {
        let err = parse_verdict(r#"{"valid": true, "uniqueness": {"passed": true}}"#).unwrap_err();
        assert!(matches!(err, GenerationError::EvaluationFault(_)));
    }
}
