//! Test-set assembly from saved session results
//!
//! Each test takes, from every strategy's pool, at most one question per
//! skill. A question is used in at most one test, a test never repeats a
//! topic/skill pair, and topics not yet in the test are preferred. Tests
//! missing a section are dropped.

use crate::generate::SessionStore;
use crate::question::QuestionRecord;
use crate::util::write_json;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// All questions one strategy produced, across its session files
#[derive(Debug, Clone)]
pub struct QuestionPool {
    pub strategy: String,
    pub questions: Vec<QuestionRecord>,
}

impl QuestionPool {
    pub fn new(strategy: impl Into<String>, questions: Vec<QuestionRecord>) -> Self {
        Self {
            strategy: strategy.into(),
            questions,
        }
    }

    pub fn load(strategy: &str, paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut questions = Vec::new();
        for path in paths {
            let result = SessionStore::load(path)?;
            // Older files may omit the topic on individual records
            questions.extend(
                result
                    .questions
                    .into_iter()
                    .map(|q| q.with_defaults("", &result.topic)),
            );
        }
        tracing::debug!(strategy, questions = questions.len(), "Loaded question pool");
        Ok(Self::new(strategy, questions))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSection {
    pub strategy: String,
    pub questions: Vec<QuestionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledTest {
    pub number: usize,
    pub sections: Vec<TestSection>,
}

/// Leftovers after assembly
#[derive(Debug, Clone, Serialize)]
pub struct UnusedStats {
    pub total_unused: usize,
    pub by_strategy: BTreeMap<String, usize>,
    pub by_skill: BTreeMap<String, usize>,
    pub by_topic: BTreeMap<String, usize>,
    /// `topic_skill` pairs that had questions but were blocked in some test
    pub invalid_combinations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TestSetFile<'a> {
    generated_at: DateTime<Utc>,
    seed: Option<u64>,
    tests: &'a [AssembledTest],
}

pub struct TestAssembler {
    pools: Vec<QuestionPool>,
    skills: Vec<String>,
    rng: StdRng,
    seed: Option<u64>,
    used: HashSet<String>,
    invalid_combinations: BTreeSet<String>,
}

impl TestAssembler {
    pub fn new(pools: Vec<QuestionPool>, skills: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            pools,
            skills,
            rng,
            seed,
            used: HashSet::new(),
            invalid_combinations: BTreeSet::new(),
        }
    }

    /// Try to build `count` tests; incomplete ones are skipped
    pub fn assemble(&mut self, count: usize) -> Vec<AssembledTest> {
        let mut tests = Vec::new();
        for attempt in 1..=count {
            let sections = self.build_test();
            if sections.iter().all(|s| !s.questions.is_empty()) {
                tracing::info!("Generated test {}", attempt);
                tests.push(AssembledTest {
                    number: tests.len() + 1,
                    sections,
                });
            } else {
                tracing::warn!("Skipped test {} due to insufficient valid questions", attempt);
            }
        }
        tests
    }

    fn build_test(&mut self) -> Vec<TestSection> {
        let mut topic_skills: HashSet<(String, String)> = HashSet::new();
        let mut test_topics: HashSet<String> = HashSet::new();

        let mut order: Vec<usize> = (0..self.pools.len()).collect();
        order.shuffle(&mut self.rng);

        let mut picked: Vec<Vec<QuestionRecord>> = vec![Vec::new(); self.pools.len()];
        for pool_index in order {
            let mut skills = self.skills.clone();
            skills.shuffle(&mut self.rng);

            for skill in &skills {
                if let Some(question) =
                    self.select(pool_index, skill, &topic_skills, &test_topics)
                {
                    topic_skills.insert((question.topic.clone(), question.skill.clone()));
                    test_topics.insert(question.topic.clone());
                    self.used.insert(question.question.clone());
                    picked[pool_index].push(question);
                }
            }
        }

        self.pools
            .iter()
            .zip(picked)
            .map(|(pool, questions)| TestSection {
                strategy: pool.strategy.clone(),
                questions,
            })
            .collect()
    }

    fn select(
        &mut self,
        pool_index: usize,
        skill: &str,
        topic_skills: &HashSet<(String, String)>,
        test_topics: &HashSet<String>,
    ) -> Option<QuestionRecord> {
        let available: Vec<&QuestionRecord> = self.pools[pool_index]
            .questions
            .iter()
            .filter(|q| q.skill == skill && !self.used.contains(&q.question))
            .collect();
        if available.is_empty() {
            return None;
        }

        let valid: Vec<&QuestionRecord> = available
            .iter()
            .copied()
            .filter(|q| !topic_skills.contains(&(q.topic.clone(), q.skill.clone())))
            .collect();
        if valid.is_empty() {
            for q in &available {
                self.invalid_combinations
                    .insert(format!("{}_{}", q.topic, q.skill));
            }
            return None;
        }

        let fresh: Vec<&QuestionRecord> = valid
            .iter()
            .copied()
            .filter(|q| !test_topics.contains(&q.topic))
            .collect();
        let candidates = if fresh.is_empty() { valid } else { fresh };
        candidates.choose(&mut self.rng).map(|q| (*q).clone())
    }

    pub fn unused_stats(&self) -> UnusedStats {
        let mut stats = UnusedStats {
            total_unused: 0,
            by_strategy: BTreeMap::new(),
            by_skill: BTreeMap::new(),
            by_topic: BTreeMap::new(),
            invalid_combinations: self.invalid_combinations.iter().cloned().collect(),
        };
        for pool in &self.pools {
            for q in pool.questions.iter().filter(|q| !self.used.contains(&q.question)) {
                stats.total_unused += 1;
                *stats.by_strategy.entry(pool.strategy.clone()).or_default() += 1;
                *stats.by_skill.entry(q.skill.clone()).or_default() += 1;
                *stats.by_topic.entry(q.topic.clone()).or_default() += 1;
            }
        }
        stats
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Write `generated_tests.json`, one `test_{n}.json` per test and
    /// `unused_statistics.json`. Returns the paths written.
    pub fn save(&self, dir: &Path, tests: &[AssembledTest]) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", dir.display(), e))?;

        let mut written = Vec::with_capacity(tests.len() + 2);

        let all = dir.join("generated_tests.json");
        write_json(
            &all,
            &TestSetFile {
                generated_at: Utc::now(),
                seed: self.seed,
                tests,
            },
        )?;
        written.push(all);

        for test in tests {
            let path = dir.join(format!("test_{}.json", test.number));
            write_json(&path, test)?;
            written.push(path);
        }

        let stats = dir.join("unused_statistics.json");
        write_json(&stats, &self.unused_stats())?;
        written.push(stats);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{sample_record, SessionResult};
    use tempfile::TempDir;

    const SKILLS: [&str; 5] = ["Remember", "Understand", "Apply", "Analyze", "Evaluate"];

    fn record(strategy: &str, topic: &str, skill: &str, n: usize) -> QuestionRecord {
        let mut q = sample_record(&format!("{} {} {} #{}", strategy, topic, skill, n), skill);
        q.topic = topic.to_string();
        q
    }

    /// Every strategy has `per_pair` questions for each topic/skill pair
    fn pools(topics: &[&str], per_pair: usize) -> Vec<QuestionPool> {
        ["LLM", "RAG", "ConceptMap"]
            .iter()
            .map(|strategy| {
                let mut questions = Vec::new();
                for topic in topics {
                    for skill in SKILLS {
                        for n in 0..per_pair {
                            questions.push(record(strategy, topic, skill, n));
                        }
                    }
                }
                QuestionPool::new(*strategy, questions)
            })
            .collect()
    }

    fn skills() -> Vec<String> {
        SKILLS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sections_take_one_question_per_skill() {
        let mut assembler = TestAssembler::new(pools(&["work", "optics", "waves"], 2), skills(), Some(42));
        let tests = assembler.assemble(2);
        assert_eq!(tests.len(), 2);

        for test in &tests {
            assert_eq!(test.sections.len(), 3);
            assert_eq!(test.sections[0].strategy, "LLM");
            for section in &test.sections {
                let skills: HashSet<&str> = section.questions.iter().map(|q| q.skill.as_str()).collect();
                assert_eq!(skills.len(), section.questions.len());
            }
        }
    }

    #[test]
    fn test_no_question_reused_and_no_topic_skill_repeat_within_test() {
        let mut assembler = TestAssembler::new(pools(&["work", "optics", "waves", "heat"], 2), skills(), Some(7));
        let tests = assembler.assemble(4);

        let mut seen = HashSet::new();
        for test in &tests {
            let mut pairs = HashSet::new();
            for q in test.sections.iter().flat_map(|s| &s.questions) {
                assert!(seen.insert(q.question.clone()), "reused {}", q.question);
                assert!(pairs.insert((q.topic.clone(), q.skill.clone())));
            }
        }
        assert_eq!(assembler.used_count(), seen.len());
    }

    #[test]
    fn test_blocked_pairs_recorded_and_incomplete_test_dropped() {
        // One topic only: once a strategy takes work/Remember, the others
        // cannot use that pair in the same test.
        let mut assembler = TestAssembler::new(pools(&["work"], 1), skills(), Some(1));
        let tests = assembler.assemble(1);

        assert!(tests.is_empty());
        let stats = assembler.unused_stats();
        assert_eq!(stats.total_unused, 10);
        assert_eq!(stats.invalid_combinations.len(), 5);
        assert_eq!(stats.by_strategy.values().sum::<usize>(), 10);
    }

    #[test]
    fn test_incomplete_test_is_skipped() {
        let mut pools = pools(&["work"], 1);
        pools[2].questions.clear();
        let mut assembler = TestAssembler::new(pools, skills(), Some(3));
        assert!(assembler.assemble(2).is_empty());
    }

    #[test]
    fn test_unused_topics_preferred() {
        let mut assembler = TestAssembler::new(pools(&["work", "optics", "waves", "heat", "sound"], 1), skills(), Some(11));
        let tests = assembler.assemble(1);
        // The pool drawn first meets no used topics, so its five picks
        // come from five distinct topics
        let distinct = tests[0]
            .sections
            .iter()
            .map(|s| s.questions.iter().map(|q| q.topic.as_str()).collect::<HashSet<_>>().len())
            .max()
            .unwrap();
        assert_eq!(distinct, 5);
    }

    #[test]
    fn test_seed_makes_runs_reproducible() {
        let a = TestAssembler::new(pools(&["work", "optics"], 2), skills(), Some(99)).assemble(2);
        let b = TestAssembler::new(pools(&["work", "optics"], 2), skills(), Some(99)).assemble(2);
        let questions = |tests: &[AssembledTest]| -> Vec<String> {
            tests
                .iter()
                .flat_map(|t| t.sections.iter().flat_map(|s| s.questions.iter().map(|q| q.question.clone())))
                .collect()
        };
        assert_eq!(questions(&a), questions(&b));
    }

    #[test]
    fn test_load_fills_topic_and_save_writes_files() {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path(), "model");
        let mut paths = Vec::new();
        for strategy in ["LLM", "RAG", "ConceptMap"] {
            let mut result = SessionResult::new("work");
            for skill in SKILLS {
                let mut q = record(strategy, "", skill, 0);
                q.topic.clear();
                result.questions.push(q);
            }
            paths.push(store.save(strategy, &result).unwrap());
        }

        let pools: Vec<QuestionPool> = ["LLM", "RAG", "ConceptMap"]
            .iter()
            .zip(&paths)
            .map(|(s, p)| QuestionPool::load(s, std::slice::from_ref(p)).unwrap())
            .collect();
        assert!(pools.iter().all(|p| p.questions.iter().all(|q| q.topic == "work")));

        let mut assembler = TestAssembler::new(pools, skills(), Some(5));
        let tests = assembler.assemble(1);
        let out = tmp.path().join("tests");
        let written = assembler.save(&out, &tests).unwrap();

        assert_eq!(written.len(), tests.len() + 2);
        assert!(out.join("generated_tests.json").exists());
        assert!(out.join("unused_statistics.json").exists());
        let all: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("generated_tests.json")).unwrap()).unwrap();
        assert_eq!(all["seed"], 5);
        assert_eq!(all["tests"].as_array().unwrap().len(), tests.len());
    }
}
