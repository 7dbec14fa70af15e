//! CSV import for the concept-map store
//!
//! `topics.csv` needs `topic_id` and `topic_name` columns; `subtopics.csv`
//! needs `topic_id` and `subtopic_name`, plus any of the descriptive columns.
//! Unknown columns are ignored. List-valued cells (`["a", "b"]`) are stored
//! as `a; b`.

use super::concept_db::SCHEMA;
use anyhow::Context;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct TopicCsv {
    topic_id: String,
    topic_name: String,
}

#[derive(Debug, Deserialize)]
struct SubtopicCsv {
    topic_id: String,
    subtopic_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mathematical_formulation: Option<String>,
    #[serde(default)]
    prerequisites: Option<String>,
    #[serde(default)]
    misconceptions: Option<String>,
    #[serde(default)]
    engineering_applications: Option<String>,
    #[serde(default)]
    cross_cutting_topics: Option<String>,
    #[serde(default)]
    analogies: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub topics: usize,
    pub subtopics: usize,
    /// Stored subtopic rows whose topic id has no topic row
    pub orphaned: usize,
}

/// Create (or extend) the database at `db_path` from the two CSV files in a
/// single transaction. With `replace`, existing rows are removed first.
pub fn import_concepts(
    topics_csv: &Path,
    subtopics_csv: &Path,
    db_path: &Path,
    replace: bool,
) -> anyhow::Result<ImportSummary> {
    let topics: Vec<TopicCsv> = read_rows(topics_csv)?;
    let subtopics: Vec<SubtopicCsv> = read_rows(subtopics_csv)?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let summary = write_rows(&mut conn, &topics, &subtopics, replace)?;
    tracing::info!(
        db = %db_path.display(),
        topics = summary.topics,
        subtopics = summary.subtopics,
        "Imported concept map"
    );
    if summary.orphaned > 0 {
        tracing::warn!(
            orphaned = summary.orphaned,
            "Subtopic rows reference unknown topic ids and will not be retrieved"
        );
    }
    Ok(summary)
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        // Line 1 is the header
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), index + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_rows(
    conn: &mut Connection,
    topics: &[TopicCsv],
    subtopics: &[SubtopicCsv],
    replace: bool,
) -> anyhow::Result<ImportSummary> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    if replace {
        tx.execute("DELETE FROM subtopics", [])?;
        tx.execute("DELETE FROM topics", [])?;
    }

    let mut summary = ImportSummary::default();
    {
        let mut insert_topic = tx.prepare(
            "INSERT OR REPLACE INTO topics (topic_id, topic_name) VALUES (?1, ?2)",
        )?;
        for topic in topics {
            if topic.topic_id.is_empty() || topic.topic_name.is_empty() {
                anyhow::bail!("Topic rows need both topic_id and topic_name");
            }
            insert_topic.execute(params![topic.topic_id, topic.topic_name])?;
            summary.topics += 1;
        }

        let mut insert_subtopic = tx.prepare(
            "INSERT INTO subtopics (topic_id, subtopic_name, description, \
             mathematical_formulation, prerequisites, misconceptions, \
             engineering_applications, cross_cutting_topics, analogies) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for row in subtopics {
            if row.topic_id.is_empty() || row.subtopic_name.is_empty() {
                anyhow::bail!("Subtopic rows need both topic_id and subtopic_name");
            }
            insert_subtopic.execute(params![
                row.topic_id,
                row.subtopic_name,
                clean_field(&row.description),
                clean_field(&row.mathematical_formulation),
                clean_field(&row.prerequisites),
                clean_field(&row.misconceptions),
                clean_field(&row.engineering_applications),
                clean_field(&row.cross_cutting_topics),
                clean_field(&row.analogies),
            ])?;
            summary.subtopics += 1;
        }
    }

    let orphaned: i64 = tx.query_row(
        "SELECT COUNT(*) FROM subtopics s WHERE NOT EXISTS \
         (SELECT 1 FROM topics t WHERE t.topic_id = s.topic_id COLLATE NOCASE)",
        [],
        |row| row.get(0),
    )?;
    summary.orphaned = usize::try_from(orphaned).unwrap_or(0);
    tx.commit()?;
    Ok(summary)
}

/// Blank cells become NULL; list literals become `a; b`
fn clean_field(raw: &Option<String>) -> Option<String> {
    let text = raw.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    if !(text.starts_with('[') && text.ends_with(']')) {
        return Some(text.to_string());
    }

    let items: Vec<String> = match serde_json::from_str::<Vec<serde_json::Value>>(text) {
        Ok(values) => values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        // Python-style literals such as ['a', 'b']
        Err(_) => {
            let inner = &text[1..text.len() - 1];
            let items: Vec<&str> = match Regex::new(r#"["']\s*,\s*["']"#) {
                Ok(re) => re.split(inner).collect(),
                Err(_) => vec![inner],
            };
            items
                .into_iter()
                .map(|item| item.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
                .collect()
        }
    };
    let joined = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ConceptDb;
    use std::fs;
    use tempfile::TempDir;

    const TOPICS: &str = "topic_id,topic_name,notes\n\
        PHY_WE,work-energy theorem,core\n\
        PHY_OPT,geometric optics,\n";

    const SUBTOPICS: &str = "topic_id,subtopic_name,description,mathematical_formulation,misconceptions\n\
        PHY_WE,Net work,Work by the net force,W = ΔK,\"[\"\"Work is always positive\"\", \"\"Work needs motion\"\"]\"\n\
        PHY_WE,Power,\"Rate of work, per second\",P = W/t,\n\
        PHY_OPT,Thin lenses,Lens equation,1/f = 1/u + 1/v,['Bigger lens means bigger image']\n";

    fn write_csvs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let topics = dir.join("topics.csv");
        let subtopics = dir.join("subtopics.csv");
        fs::write(&topics, TOPICS).unwrap();
        fs::write(&subtopics, SUBTOPICS).unwrap();
        (topics, subtopics)
    }

    #[test]
    fn test_import_is_readable_through_concept_db() {
        let tmp = TempDir::new().unwrap();
        let (topics, subtopics) = write_csvs(tmp.path());
        let db_path = tmp.path().join("data").join("concepts.db");

        let summary = import_concepts(&topics, &subtopics, &db_path, false).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                topics: 2,
                subtopics: 3,
                orphaned: 0
            }
        );

        let db = ConceptDb::open(&db_path).unwrap();
        let names: Vec<_> = db.topics().unwrap().into_iter().map(|t| t.topic_name).collect();
        assert_eq!(names, vec!["geometric optics", "work-energy theorem"]);

        let rows = db.subtopics("phy_we", 10).unwrap();
        assert_eq!(rows.len(), 2);
        let net = rows.iter().find(|r| r.subtopic_name == "Net work").unwrap();
        assert_eq!(net.misconceptions, "Work is always positive; Work needs motion");
        assert_eq!(net.mathematical_formulation, "W = ΔK");
        assert_eq!(net.analogies, "");
        let power = rows.iter().find(|r| r.subtopic_name == "Power").unwrap();
        assert_eq!(power.description, "Rate of work, per second");

        let context = db.context_for("PHY_OPT", 3).unwrap();
        assert!(context.contains("Common misconceptions: Bigger lens means bigger image"));
    }

    #[test]
    fn test_reimport_appends_unless_replaced() {
        let tmp = TempDir::new().unwrap();
        let (topics, subtopics) = write_csvs(tmp.path());
        let db_path = tmp.path().join("concepts.db");

        import_concepts(&topics, &subtopics, &db_path, false).unwrap();
        import_concepts(&topics, &subtopics, &db_path, false).unwrap();
        let db = ConceptDb::open(&db_path).unwrap();
        assert_eq!(db.topics().unwrap().len(), 2);
        assert_eq!(db.subtopics("PHY_WE", 10).unwrap().len(), 4);
        drop(db);

        import_concepts(&topics, &subtopics, &db_path, true).unwrap();
        let db = ConceptDb::open(&db_path).unwrap();
        assert_eq!(db.subtopics("PHY_WE", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_orphaned_subtopics_are_counted() {
        let tmp = TempDir::new().unwrap();
        let topics = tmp.path().join("topics.csv");
        let subtopics = tmp.path().join("subtopics.csv");
        fs::write(&topics, "topic_id,topic_name\nPHY_WE,work-energy theorem\n").unwrap();
        fs::write(
            &subtopics,
            "topic_id,subtopic_name\nPHY_WE,Net work\nPHY_X,Mystery\n",
        )
        .unwrap();

        let summary =
            import_concepts(&topics, &subtopics, &tmp.path().join("c.db"), false).unwrap();
        assert_eq!(summary.subtopics, 2);
        assert_eq!(summary.orphaned, 1);
    }

    #[test]
    fn test_missing_required_column_fails_without_writing() {
        let tmp = TempDir::new().unwrap();
        let topics = tmp.path().join("topics.csv");
        let subtopics = tmp.path().join("subtopics.csv");
        fs::write(&topics, "id,name\nPHY_WE,work-energy theorem\n").unwrap();
        fs::write(&subtopics, "topic_id,subtopic_name\nPHY_WE,Net work\n").unwrap();
        let db_path = tmp.path().join("c.db");

        assert!(import_concepts(&topics, &subtopics, &db_path, false).is_err());
        assert!(!db_path.exists());
    }

    #[test]
    fn test_clean_field() {
        assert_eq!(clean_field(&None), None);
        assert_eq!(clean_field(&Some("  ".to_string())), None);
        assert_eq!(clean_field(&Some(" F = ma ".to_string())), Some("F = ma".to_string()));
        assert_eq!(
            clean_field(&Some(r#"["a", "b"]"#.to_string())),
            Some("a; b".to_string())
        );
        assert_eq!(
            clean_field(&Some("['inertia', 'mass']".to_string())),
            Some("inertia; mass".to_string())
        );
        assert_eq!(clean_field(&Some("[]".to_string())), None);
    }
}
