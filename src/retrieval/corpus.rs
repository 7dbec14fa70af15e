//! Lexical retrieval over a directory of reference texts
//!
//! Files under the store directory (`.txt` and `.md`) are split into
//! paragraph chunks at load time. A query ranks chunks by how many distinct
//! query terms they contain, term frequency breaking ties.

use super::Retriever;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Terms shorter than this are ignored when ranking
const MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone)]
struct Chunk {
    source: PathBuf,
    text: String,
    terms: Vec<String>,
}

#[derive(Debug)]
pub struct CorpusRetriever {
    chunks: Vec<Chunk>,
    top_k: usize,
}

impl CorpusRetriever {
    /// Load every supported file under `root`. A missing directory is an
    /// error; an empty one is not.
    pub fn open(root: &Path, top_k: usize) -> anyhow::Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Vector store directory not found: {}", root.display());
        }

        let mut chunks = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !is_supported(path) {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable file: {}", e);
                    continue;
                }
            };
            chunks.extend(split_chunks(&content).into_iter().map(|text| Chunk {
                source: path.to_path_buf(),
                terms: terms(&text),
                text,
            }));
        }

        tracing::debug!(root = %root.display(), chunks = chunks.len(), "Corpus loaded");
        Ok(Self {
            chunks,
            top_k: top_k.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k matching chunks, best first, with their source files
    pub fn search(&self, query: &str) -> Vec<(&Path, &str)> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(index, chunk)| {
                let distinct = query_terms
                    .iter()
                    .filter(|t| chunk.terms.contains(t))
                    .count();
                if distinct == 0 {
                    return None;
                }
                let frequency = chunk
                    .terms
                    .iter()
                    .filter(|t| query_terms.contains(*t))
                    .count();
                Some((index, distinct, frequency))
            })
            .collect();

        // Stable sort keeps corpus order among equal scores
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        scored
            .into_iter()
            .take(self.top_k)
            .map(|(index, _, _)| {
                let chunk = &self.chunks[index];
                (chunk.source.as_path(), chunk.text.as_str())
            })
            .collect()
    }
}

impl Retriever for CorpusRetriever {
    fn retrieve(&self, query: &str) -> anyhow::Result<String> {
        let hits = self.search(query);
        Ok(hits
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("txt") | Some("md")
    )
}

/// Paragraphs separated by blank lines, internal whitespace collapsed
fn split_chunks(content: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                chunks.push(collapse(&current));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        chunks.push(collapse(&current));
    }
    chunks
}

fn collapse(lines: &[&str]) -> String {
    lines
        .iter()
        .flat_map(|l| l.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("energy.txt"),
            "The work-energy theorem states that net work equals the change in kinetic energy.\n\n\
             Potential energy is stored energy.\n\nFriction converts\nmechanical energy to heat.",
        )
        .unwrap();
        fs::create_dir(tmp.path().join("optics")).unwrap();
        fs::write(
            tmp.path().join("optics").join("lenses.md"),
            "# Lenses\n\nA converging lens focuses parallel rays.",
        )
        .unwrap();
        fs::write(tmp.path().join("ignored.csv"), "work,energy,theorem").unwrap();
        tmp
    }

    #[test]
    fn test_open_splits_paragraphs_and_skips_other_files() {
        let tmp = corpus();
        let retriever = CorpusRetriever::open(tmp.path(), 3).unwrap();
        assert_eq!(retriever.len(), 5);
    }

    #[test]
    fn test_search_ranks_by_distinct_terms() {
        let tmp = corpus();
        let retriever = CorpusRetriever::open(tmp.path(), 2).unwrap();
        let hits = retriever.search("work-energy theorem");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].1.starts_with("The work-energy theorem"));
        assert!(hits[0].0.ends_with("energy.txt"));
    }

    #[test]
    fn test_retrieve_joins_top_k_with_spaces() {
        let tmp = corpus();
        let retriever = CorpusRetriever::open(tmp.path(), 2).unwrap();
        let context = retriever.retrieve("kinetic energy heat").unwrap();
        assert!(!context.contains('\n'));
        assert!(context.contains("kinetic energy."));
        assert!(context.contains("Friction converts mechanical energy to heat."));
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let tmp = corpus();
        let retriever = CorpusRetriever::open(tmp.path(), 3).unwrap();
        assert_eq!(retriever.retrieve("superconductivity").unwrap(), "");
        assert_eq!(retriever.retrieve("a b").unwrap(), "");
    }

    #[test]
    fn test_missing_directory_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(CorpusRetriever::open(&tmp.path().join("absent"), 3).is_err());
    }
}
