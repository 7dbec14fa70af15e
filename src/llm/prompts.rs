//! Built-in prompt templates
//!
//! Templates use `{name}` placeholders filled by `render`. Any of them can be
//! replaced from the `[prompts]` config section.

pub const SYSTEM: &str =
    "You are a helpful assistant. Please make sure you follow user instructions.";

pub const GENERATION_OUTPUT_FORMAT: &str = r#"Return ONLY a JSON object, with no commentary, in exactly this shape:
{
  "question": "the question stem",
  "skill": "the skill label you were given",
  "topic": "the topic you were given",
  "options": {"a": "...", "b": "...", "c": "...", "d": "..."},
  "correct_answer": "one of a, b, c or d"
}"#;

pub const EVALUATION_OUTPUT_FORMAT: &str = r#"Return ONLY a JSON object, with no commentary, in exactly this shape:
{
  "valid": true or false,
  "uniqueness": {"passed": true or false, "issues": "what overlaps with earlier questions, or empty"},
  "answer_correctness": {"passed": true or false, "issues": "why the marked answer is wrong or ambiguous, or empty"}
}
"valid" is true only when both criteria pass."#;

pub const DIRECT_GENERATION: &str = r#"Write one multiple-choice physics question for a grade {grade} student on the topic "{topic}".

The question must test the cognitive skill "{skill}": {skill_requirement}

Give exactly four options labelled a to d. Exactly one option is correct; the other three are plausible distractors built from common student misconceptions.

{output_format_generation}"#;

pub const RAG_GENERATION: &str = r#"Write one multiple-choice physics question for a grade {grade} student on the topic "{topic}".

Ground the question in this reference material:
---
{context}
---

The question must test the cognitive skill "{skill}": {skill_requirement}

Give exactly four options labelled a to d. Exactly one option is correct; the other three are plausible distractors built from common student misconceptions.

{output_format_generation}"#;

pub const CONCEPT_MAP_GENERATION: &str = r#"Write one multiple-choice physics question for a grade {grade} student on the topic "{topic}".

Use this concept map of the topic (subtopics, formulations, prerequisites, misconceptions, applications, analogies):
---
{context}
---

The question must test the cognitive skill "{skill}": {skill_requirement}

Build the distractors from the listed misconceptions where possible.
The question must be substantively different from these earlier questions:
{question_history}

{output_format_generation}"#;

pub const EVALUATION: &str = r#"You are reviewing a generated multiple-choice physics question.

Question:
{question}

Previously accepted questions in this set:
{previous_questions}

Check two criteria independently:
1. uniqueness: the question is substantively different from every previously accepted question (not a rewording, not the same calculation with new numbers).
2. answer_correctness: the option marked as correct_answer is actually correct, and no other option is also correct.

{output_format_evaluation}"#;

pub const FIX_UNIQUENESS: &str = r#"The following question for skill "{skill}" was rejected because it repeats earlier material.

Rejected question:
{question}

Review:
{evaluation}

Earlier questions it must NOT resemble:
{previous_questions}

Write a NEW question for the same skill and topic that covers a different aspect of the topic.

{output_format_generation}"#;

pub const FIX_ANSWER: &str = r#"The following question for skill "{skill}" was rejected by a reviewer.

Question:
{question}

Review:
{evaluation}

Correct the question so that the marked answer is right and unambiguous. Keep the stem and options unless they cause the problem.

{output_format_generation}"#;

pub const TOPIC_IDENTIFIER: &str = r#"You identify the physics topic a teacher wants questions about.
Reply with the topic name only (for example: work-energy theorem), in lowercase, with no punctuation and no explanation."#;

pub const TOPIC_MATCH: &str = r#"A teacher wants questions on: {topic_of_interest}

Known topics, one per line as "topic name | topic id":
{topics}

Reply with the topic id of the single best match only, with no explanation."#;

/// Fill `{name}` placeholders in one pass over the template. Unknown
/// placeholders and literal braces are left as they are, and substituted
/// values are never expanded again.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
