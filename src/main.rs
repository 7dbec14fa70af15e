use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use mcq_forge::assemble::{QuestionPool, TestAssembler};
use mcq_forge::config::Config;
use mcq_forge::generate::{SessionReport, SessionRunner, SessionStore, SkillStatus};
use mcq_forge::llm::{LlmClient, TextGenerator};
use mcq_forge::retrieval::import_concepts;
use mcq_forge::strategies::{self, StrategyKind};
use mcq_forge::topic::TopicIdentifier;
use mcq_forge::util::truncate;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "mcq-forge",
    about = "Generate and review multiple-choice physics questions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/mcq-forge/config.toml or $MCQ_FORGE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate one question per skill for a topic
    #[command(group(ArgGroup::new("subject").required(true).args(["topic", "query"])))]
    Generate {
        /// Topic name, e.g. "work-energy theorem"
        #[arg(short, long)]
        topic: Option<String>,

        /// Free-text request; the topic is identified by the model
        #[arg(short, long)]
        query: Option<String>,

        /// Student grade level
        #[arg(short, long, default_value = "9")]
        grade: u8,

        /// Strategy to run
        #[arg(short, long, value_enum, default_value = "all")]
        strategy: StrategyChoice,

        /// Use this file as grounding context instead of retrieval
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Attempt budget per skill (overrides retry.attempts)
        #[arg(short, long)]
        attempts: Option<u32>,

        /// Where session files are written (overrides output.directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the topic identified in a free-text request
    Identify {
        query: String,
    },

    /// Build the concept-map database from topics and subtopics CSV files
    ImportConcepts {
        #[arg(long)]
        topics: PathBuf,

        #[arg(long)]
        subtopics: PathBuf,

        /// Database to create or extend (defaults to concept_db.path)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Remove existing rows before importing
        #[arg(long)]
        replace: bool,
    },

    /// Build tests from saved session files of all three strategies
    Assemble {
        /// Session files from the direct strategy
        #[arg(long, required = true, num_args = 1..)]
        llm: Vec<PathBuf>,

        /// Session files from the retrieval-augmented strategy
        #[arg(long, required = true, num_args = 1..)]
        rag: Vec<PathBuf>,

        /// Session files from the concept-map strategy
        #[arg(long, required = true, num_args = 1..)]
        concept_map: Vec<PathBuf>,

        /// Number of tests to attempt
        #[arg(short = 'n', long, default_value = "15")]
        tests: usize,

        /// Seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long, default_value = "generated_tests")]
        output_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyChoice {
    Llm,
    Rag,
    ConceptMap,
    All,
}

impl StrategyChoice {
    fn kinds(self) -> Vec<StrategyKind> {
        match self {
            StrategyChoice::Llm => vec![StrategyKind::Llm],
            StrategyChoice::Rag => vec![StrategyKind::Rag],
            StrategyChoice::ConceptMap => vec![StrategyKind::ConceptMap],
            StrategyChoice::All => StrategyKind::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).with_context(|| {
        format!("Failed to load configuration (default location: {})", Config::config_location())
    })?;

    match cli.command {
        Commands::Generate {
            topic,
            query,
            grade,
            strategy,
            context_file,
            attempts,
            output_dir,
        } => {
            if let Some(attempts) = attempts {
                anyhow::ensure!(attempts >= 1, "--attempts must be at least 1");
                config.retry.attempts = attempts;
            }
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            let context = match context_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };

            let generator: Arc<dyn TextGenerator> = Arc::new(LlmClient::from_config(&config)?);
            let topic = match (topic, query) {
                (Some(topic), _) => topic,
                (None, Some(query)) => {
                    TopicIdentifier::from_config(generator.clone(), &config)
                        .identify(&query)
                        .await?
                }
                (None, None) => anyhow::bail!("Either --topic or --query is required"),
            };

            run_generate(&config, generator, &topic, grade, strategy, context.as_deref()).await
        }
        Commands::Identify { query } => {
            let generator: Arc<dyn TextGenerator> = Arc::new(LlmClient::from_config(&config)?);
            let topic = TopicIdentifier::from_config(generator, &config)
                .identify(&query)
                .await?;
            println!("{}", topic);
            Ok(())
        }
        Commands::ImportConcepts {
            topics,
            subtopics,
            db,
            replace,
        } => {
            let db = db.unwrap_or_else(|| config.concept_db.path.clone());
            let summary = import_concepts(&topics, &subtopics, &db, replace)?;
            println!(
                "Imported {} topic(s) and {} subtopic(s) into {}",
                summary.topics,
                summary.subtopics,
                db.display()
            );
            if summary.orphaned > 0 {
                println!(
                    "{} subtopic row(s) reference unknown topic ids",
                    summary.orphaned
                );
            }
            Ok(())
        }
        Commands::Assemble {
            llm,
            rag,
            concept_map,
            tests,
            seed,
            output_dir,
        } => run_assemble(&config, &llm, &rag, &concept_map, tests, seed, output_dir),
    }
}

async fn run_generate(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
    topic: &str,
    grade: u8,
    choice: StrategyChoice,
    context: Option<&str>,
) -> Result<()> {
    let skills = config.skill_set()?;
    let store = SessionStore::new(&config.output.directory, config.model.short_name());
    let kinds = choice.kinds();

    eprintln!(
        "Generating {} question(s) on \"{}\" (grade {}) with {}",
        skills.len(),
        topic,
        grade,
        config.model.id
    );

    for kind in kinds {
        let strategy = match strategies::build(kind, generator.clone(), config) {
            Ok(strategy) => strategy,
            // A single requested strategy that cannot start is a startup error
            Err(err) if choice != StrategyChoice::All => return Err(err),
            Err(err) => {
                tracing::error!(strategy = ?kind, "Strategy unavailable: {:#}", err);
                continue;
            }
        };

        let report = SessionRunner::new(strategy.as_ref(), &skills)
            .with_attempts(config.retry.attempts)
            .with_store(&store)
            .run(topic, grade, context)
            .await;
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    println!();
    println!(
        "{}: {}/{} question(s) accepted, {} after fixing",
        report.strategy,
        report.accepted(),
        report.skills.len(),
        report.fixed()
    );
    for skill in &report.skills {
        let status = match &skill.status {
            SkillStatus::Accepted { fixed: false } => "accepted".to_string(),
            SkillStatus::Accepted { fixed: true } => "accepted (fixed)".to_string(),
            SkillStatus::Rejected => "rejected".to_string(),
            SkillStatus::Skipped(reason) => format!("skipped: {}", reason),
        };
        println!(
            "  {:<12} {:<24} attempts {}, model calls {}",
            skill.skill,
            status,
            skill.attempts,
            skill.model_calls()
        );
    }
    for question in &report.result.questions {
        println!("  - [{}] {}", question.skill, truncate(&question.question, 90));
    }
    match &report.saved_to {
        Some(path) => println!("  saved to {}", path.display()),
        None => println!("  not saved"),
    }
}

fn run_assemble(
    config: &Config,
    llm: &[PathBuf],
    rag: &[PathBuf],
    concept_map: &[PathBuf],
    tests: usize,
    seed: Option<u64>,
    output_dir: PathBuf,
) -> Result<()> {
    let pools = vec![
        QuestionPool::load("LLM", llm)?,
        QuestionPool::load("RAG", rag)?,
        QuestionPool::load("ConceptMap", concept_map)?,
    ];

    let mut assembler = TestAssembler::new(pools, config.skills.list.clone(), seed);
    let assembled = assembler.assemble(tests);
    let written = assembler.save(&output_dir, &assembled)?;

    let stats = assembler.unused_stats();
    println!(
        "Generated {} of {} test(s) using {} question(s); {} left unused",
        assembled.len(),
        tests,
        assembler.used_count(),
        stats.total_unused
    );
    if !stats.invalid_combinations.is_empty() {
        println!(
            "Blocked topic/skill combinations: {}",
            stats.invalid_combinations.len()
        );
    }
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}
