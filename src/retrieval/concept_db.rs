//! Concept-map store
//!
//! Read-only access to a SQLite database with two tables:
//! `topics(topic_id, topic_name)` and `subtopics(topic_id, subtopic_name,
//! description, mathematical_formulation, prerequisites, misconceptions,
//! engineering_applications, cross_cutting_topics, analogies)`.
//! `import` builds one from CSV files.

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS topics (
    topic_id TEXT PRIMARY KEY,
    topic_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS subtopics (
    topic_id TEXT NOT NULL,
    subtopic_name TEXT NOT NULL,
    description TEXT,
    mathematical_formulation TEXT,
    prerequisites TEXT,
    misconceptions TEXT,
    engineering_applications TEXT,
    cross_cutting_topics TEXT,
    analogies TEXT
);
CREATE INDEX IF NOT EXISTS idx_subtopics_topic ON subtopics(topic_id);
";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicRow {
    pub topic_id: String,
    pub topic_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtopicRow {
    pub subtopic_name: String,
    pub description: String,
    pub mathematical_formulation: String,
    pub prerequisites: String,
    pub misconceptions: String,
    pub engineering_applications: String,
    pub cross_cutting_topics: String,
    pub analogies: String,
}

impl SubtopicRow {
    /// Labelled text block used as generation context
    pub fn render(&self) -> String {
        let fields = [
            ("Subtopic", &self.subtopic_name),
            ("Description", &self.description),
            ("Mathematical formulation", &self.mathematical_formulation),
            ("Prerequisites", &self.prerequisites),
            ("Common misconceptions", &self.misconceptions),
            ("Engineering applications", &self.engineering_applications),
            ("Cross-cutting topics", &self.cross_cutting_topics),
            ("Analogies", &self.analogies),
        ];
        fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(label, value)| format!("{}: {}", label, value.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ConceptDb {
    conn: Mutex<Connection>,
}

impl ConceptDb {
    /// Open an existing database read-only
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Concept database not found: {}", path.display());
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Concept database lock poisoned"))
    }

    pub fn topics(&self) -> anyhow::Result<Vec<TopicRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT topic_id, topic_name FROM topics ORDER BY topic_name")?;
        let rows = stmt.query_map([], |row| {
            Ok(TopicRow {
                topic_id: row.get(0)?,
                topic_name: row.get(1)?,
            })
        })?;

        let mut topics = Vec::new();
        for row in rows {
            topics.push(row?);
        }
        Ok(topics)
    }

    /// Up to `limit` random subtopic rows for a topic id (case-insensitive)
    pub fn subtopics(&self, topic_id: &str, limit: usize) -> anyhow::Result<Vec<SubtopicRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT s.subtopic_name, s.description, s.mathematical_formulation, \
             s.prerequisites, s.misconceptions, s.engineering_applications, \
             s.cross_cutting_topics, s.analogies \
             FROM subtopics s \
             JOIN topics t ON s.topic_id = t.topic_id \
             WHERE t.topic_id = ?1 COLLATE NOCASE \
             ORDER BY RANDOM() \
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![topic_id.trim(), limit], |row| {
            Ok(SubtopicRow {
                subtopic_name: row.get(0)?,
                description: text_or_empty(row, 1)?,
                mathematical_formulation: text_or_empty(row, 2)?,
                prerequisites: text_or_empty(row, 3)?,
                misconceptions: text_or_empty(row, 4)?,
                engineering_applications: text_or_empty(row, 5)?,
                cross_cutting_topics: text_or_empty(row, 6)?,
                analogies: text_or_empty(row, 7)?,
            })
        })?;

        let mut subtopics = Vec::new();
        for row in rows {
            subtopics.push(row?);
        }
        Ok(subtopics)
    }

    /// Rendered context for a topic id; empty when the topic has no rows
    pub fn context_for(&self, topic_id: &str, limit: usize) -> anyhow::Result<String> {
        let rows = self.subtopics(topic_id, limit)?;
        Ok(rows
            .iter()
            .map(SubtopicRow::render)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn text_or_empty(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(index)?.unwrap_or_default())
}

#[cfg(test)]
pub(crate) fn seeded_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(
        "INSERT INTO topics VALUES ('PHY_WE', 'work-energy theorem'), ('PHY_OPT', 'geometric optics');
         INSERT INTO subtopics VALUES
             ('PHY_WE', 'Net work', 'Work by the net force', 'W = ΔK', 'Newton''s laws',
              'Work is always positive', 'Braking distance', 'Momentum', 'Paying into a bank account'),
             ('PHY_WE', 'Kinetic energy', 'Energy of motion', 'K = ½mv²', 'Velocity',
              NULL, 'Crash testing', 'Power', NULL),
             ('PHY_WE', 'Conservative forces', 'Path-independent work', 'W = -ΔU', 'Potential energy',
              'Friction is conservative', 'Roller coasters', 'Fields', 'Hiking loops'),
             ('PHY_WE', 'Power', 'Rate of work', 'P = W/t', 'Work',
              'Power equals energy', 'Engines', 'Electricity', 'Water flow rate'),
             ('PHY_OPT', 'Thin lenses', 'Lens equation', '1/f = 1/u + 1/v', 'Refraction',
              'Bigger lens means bigger image', 'Cameras', 'Waves', 'Funnel');",
    )
    .unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_topics_listed() {
        let db = ConceptDb::from_connection(seeded_connection());
        let topics = db.topics().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].topic_name, "geometric optics");
        assert_eq!(topics[1].topic_id, "PHY_WE");
    }

    #[test]
    fn test_subtopics_limited_and_case_insensitive() {
        let db = ConceptDb::from_connection(seeded_connection());
        let rows = db.subtopics("phy_we", 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.subtopic_name != "Thin lenses"));

        let all = db.subtopics("PHY_WE", 10).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_context_renders_labelled_fields_and_skips_nulls() {
        let db = ConceptDb::from_connection(seeded_connection());
        let context = db.context_for("PHY_OPT", 3).unwrap();
        assert!(context.contains("Subtopic: Thin lenses"));
        assert!(context.contains("Mathematical formulation: 1/f = 1/u + 1/v"));
        assert!(context.contains("Common misconceptions: Bigger lens means bigger image"));

        let kinetic = SubtopicRow {
            subtopic_name: "Kinetic energy".to_string(),
            description: "Energy of motion".to_string(),
            mathematical_formulation: "K = ½mv²".to_string(),
            prerequisites: String::new(),
            misconceptions: String::new(),
            engineering_applications: String::new(),
            cross_cutting_topics: String::new(),
            analogies: String::new(),
        };
        assert_eq!(
            kinetic.render(),
            "Subtopic: Kinetic energy\nDescription: Energy of motion\nMathematical formulation: K = ½mv²"
        );
    }

    #[test]
    fn test_unknown_topic_gives_empty_context() {
        let db = ConceptDb::from_connection(seeded_connection());
        assert_eq!(db.context_for("PHY_NONE", 3).unwrap(), "");
    }

    #[test]
    fn test_open_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(ConceptDb::open(&tmp.path().join("absent.db")).is_err());
    }

    #[test]
    fn test_open_reads_file_database() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("concepts.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE topics (topic_id TEXT, topic_name TEXT);
             INSERT INTO topics VALUES ('PHY_W', 'waves');",
        )
        .unwrap();
        drop(conn);

        let db = ConceptDb::open(&path).unwrap();
        assert_eq!(db.topics().unwrap()[0].topic_name, "waves");
    }
}
