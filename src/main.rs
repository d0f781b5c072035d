use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use adaptive_task_engine::config::{load_task_catalog, Config, ConfigError, DatabaseTarget};
use adaptive_task_engine::engine::queue::DailyReviewQueue;
use adaptive_task_engine::engine::scheduler::RetentionMetrics;
use adaptive_task_engine::engine::{AdaptiveEngine, Task, UnifiedTaskDifficulty};
use adaptive_task_engine::logging::init_tracing;
use adaptive_task_engine::session::{CategoryInsights, CoachSession};
use adaptive_task_engine::storage::{LearningStore, SqliteInitError, SqliteStore};

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open database: {0}")]
    Database(#[from] SqliteInitError),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Recommendation<'a> {
    task: &'a Task,
    difficulty: UnifiedTaskDifficulty,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    user_id: &'a str,
    queue: DailyReviewQueue,
    recommended: Option<Recommendation<'a>>,
    retention: RetentionMetrics,
    categories: CategoryInsights,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "adaptive-task-engine failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), RunError> {
    let tasks = match &config.tasks_file {
        Some(path) => load_task_catalog(path)?,
        None => {
            tracing::warn!("ENGINE_TASKS_FILE not set, reporting on stored reviews only");
            Vec::new()
        }
    };

    let store = match config.database_target() {
        DatabaseTarget::Url(url) => SqliteStore::connect(&url).await?,
        DatabaseTarget::File(path) => {
            tracing::info!(path = %path.display(), "using local sqlite database");
            SqliteStore::open(&path).await?
        }
    };
    let store: Arc<dyn LearningStore> = Arc::new(store);

    let now = Utc::now();
    let engine = AdaptiveEngine::new(config.engine.clone());
    let session = CoachSession::open(store, engine, &config.user_id, now).await;

    let queue = session.daily_queue(&tasks, &config.streak, None, now);
    let recommended = session
        .recommended_next(&tasks, &config.streak, now)
        .map(|task| Recommendation {
            task,
            difficulty: session.difficulty_for(task, &config.streak, now),
        });

    tracing::info!(
        tasks = tasks.len(),
        queued = queue.total_items,
        urgent = queue.urgent_count(),
        "daily review queue generated"
    );

    let report = Report {
        user_id: session.user_id(),
        queue,
        recommended,
        retention: session.retention_metrics(),
        categories: session.category_insights(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
