//! Cognitive task management engine
//!
//! `ctm` tracks units of work ("tasks") across assistant sessions: a
//! priority queue with decay-based scoring, a bounded working memory of hot
//! tasks, durable checkpoints and snapshots, and extraction of decisions and
//! learnings into a consolidated store. State is plain JSON under a single
//! root directory; concurrent invocations coordinate through atomic file
//! replacement and per-record versioning.
// This is the binary entry point. It is responsible for:
// - Parsing command-line arguments and resolving the engine root.
// - Initializing logging (stderr for CLI verbs, a log file for hooks).
// - Dispatching to the engine components.
// - Mapping errors to exit codes; hook verbs always exit 0.

// Use jemalloc as the global allocator for better performance
#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

mod checkpoint;
mod extractor;
mod hooks;
mod index;
mod scheduler;
mod store;
mod triggers;
mod working_memory;

#[cfg(test)]
mod tests;

use checkpoint::{CheckpointKind, CheckpointManager};
use extractor::Extractor;
use hooks::Orchestrator;
use scheduler::Scheduler;
use shared::config::{resolve_root, CtmConfig, CONFIG_FILE};
use shared::task::{PriorityLevel, Task, TaskStatus};
use shared::utils::{generate_task_id, truncate_string};
use shared::CtmError;
use store::StateStore;
use working_memory::WorkingMemoryState;

/// Command-line arguments for the task engine
#[derive(Parser, Debug)]
#[command(name = "ctm")]
#[command(about = "Cognitive task management engine", long_about = None)]
struct CliArgs {
    /// Override the engine root directory (defaults to $CTM_ROOT, then ~/.ctm)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the root directory layout and write the default configuration
    Init,
    /// Create a new task
    Spawn {
        /// Short task title
        title: String,
        /// What done looks like, in prose
        #[arg(long)]
        goal: Option<String>,
        /// Project path the task belongs to (defaults to the current directory)
        #[arg(long)]
        project: Option<String>,
        /// Priority level: critical, high, normal, low or background
        #[arg(long)]
        priority: Option<String>,
        /// Deadline as YYYY-MM-DD or RFC 3339
        #[arg(long)]
        deadline: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Comma-separated ids of tasks that must complete first
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Vec<String>,
        /// Parent task id
        #[arg(long)]
        parent: Option<String>,
        /// Switch to the new task immediately
        #[arg(long)]
        switch: bool,
    },
    /// Make the given task active
    Switch {
        /// Task id
        id: String,
    },
    /// Show the queue and working memory
    Status {
        /// Only tasks at this priority level
        #[arg(long)]
        priority: Option<String>,
        /// Only tasks in this project
        #[arg(long)]
        project: Option<String>,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Emit the session briefing
    Brief,
    /// Manually checkpoint the active task
    Checkpoint,
    /// Append to the active task's context
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },
    /// Complete a task and extract its decisions and learnings
    Complete {
        /// Task id
        id: String,
    },
    /// Cancel a task
    Cancel {
        /// Task id
        id: String,
        /// Discard the record instead of retaining it
        #[arg(long)]
        discard: bool,
    },
    /// Show a task's acceptance criteria
    Verify {
        /// Task id
        id: String,
    },
    /// Inspect or reload the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Lifecycle hook entry points, invoked by the host environment
    Hook {
        #[command(subcommand)]
        command: HookCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ContextCommand {
    /// Add context to the active task
    Add {
        /// Record a decision
        #[arg(long)]
        decision: Option<String>,
        /// Record a learning
        #[arg(long)]
        learning: Option<String>,
        /// Register a key file
        #[arg(long)]
        file: Option<String>,
        /// Set or move the deadline (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        deadline: Option<String>,
        /// Set the urgency input, 0 to 1
        #[arg(long)]
        urgency: Option<f64>,
        /// Set the value input, 0 to 1
        #[arg(long)]
        value: Option<f64>,
        /// Set the user signal, -1 to 1
        #[arg(long)]
        signal: Option<f64>,
        /// Add a blocker by task id
        #[arg(long = "blocked-by")]
        blocked_by: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Re-read and validate the configuration file
    Reload,
}

#[derive(Subcommand, Debug)]
enum HookCommand {
    /// Session start: repair, rank, warm, and print the briefing
    SessionStart {
        /// Working directory of the session (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Pre-compaction: checkpoint and relieve memory pressure
    PreCompact,
    /// Session end: persist, checkpoint, extract and summarize
    SessionEnd {
        /// Working directory of the session (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Inspect a user utterance for task triggers
    UserPrompt {
        /// The utterance to classify
        utterance: String,
    },
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let root = match args.root.clone().map(Ok).unwrap_or_else(resolve_root) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let is_hook = matches!(args.command, Command::Hook { .. });
    let _log_guard = init_logging(is_hook, &root);

    match run(args, root).await {
        Ok(()) => {}
        Err(e) if is_hook => {
            // Hooks are fail-silent: diagnostics go to the log file and the
            // host environment sees a clean exit.
            warn!(error = %e, "hook failed internally");
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Set up tracing. CLI verbs log to stderr; hook verbs log to a file under
/// the engine root so their stdout stays parseable by the host environment.
fn init_logging(is_hook: bool, root: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;

    if is_hook {
        let logs_dir = root.join("logs/hooks");
        if std::fs::create_dir_all(&logs_dir).is_err() {
            // Fall back to stderr rather than losing diagnostics entirely
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            return None;
        }
        let appender = tracing_appender::rolling::daily(logs_dir, "hooks.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init();
        Some(guard)
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        None
    }
}

async fn run(args: CliArgs, root: PathBuf) -> Result<()> {
    let config = CtmConfig::load(&root)?;
    let store = StateStore::new(
        root.clone(),
        config.update_retry_limit,
        config.update_retry_base_ms,
    );

    match args.command {
        Command::Init => cmd_init(&store, &config).await,
        Command::Spawn {
            title,
            goal,
            project,
            priority,
            deadline,
            tags,
            blocked_by,
            parent,
            switch,
        } => {
            cmd_spawn(
                &store, &config, title, goal, project, priority, deadline, tags, blocked_by,
                parent, switch,
            )
            .await
        }
        Command::Switch { id } => cmd_switch(&store, &config, &id).await,
        Command::Status {
            priority,
            project,
            json,
        } => cmd_status(&store, &config, priority, project, json).await,
        Command::Brief => {
            let orchestrator = Orchestrator::new(store.clone(), config.clone());
            println!("{}", orchestrator.brief().await);
            Ok(())
        }
        Command::Checkpoint => cmd_checkpoint(&store, &config).await,
        Command::Context { command } => match command {
            ContextCommand::Add {
                decision,
                learning,
                file,
                deadline,
                urgency,
                value,
                signal,
                blocked_by,
            } => {
                cmd_context_add(
                    &store, &config, decision, learning, file, deadline, urgency, value, signal,
                    blocked_by,
                )
                .await
            }
        },
        Command::Complete { id } => {
            cmd_terminal_transition(&store, &config, &id, TaskStatus::Completed, false).await
        }
        Command::Cancel { id, discard } => {
            cmd_terminal_transition(&store, &config, &id, TaskStatus::Cancelled, discard).await
        }
        Command::Verify { id } => cmd_verify(&store, &id).await,
        Command::Config { command } => match command {
            ConfigCommand::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigCommand::Reload => {
                let reloaded = CtmConfig::load(&root)?;
                println!(
                    "configuration ok: {} hot slots, {} token budget",
                    reloaded.max_hot_tasks, reloaded.token_budget
                );
                Ok(())
            }
        },
        Command::Hook { command } => {
            let orchestrator = Orchestrator::new(store.clone(), config.clone());
            match command {
                HookCommand::SessionStart { dir } => {
                    let dir = working_dir_string(dir);
                    println!("{}", orchestrator.session_start(&dir).await);
                }
                HookCommand::PreCompact => {
                    let dir = working_dir_string(None);
                    println!("{}", orchestrator.pre_compact(&dir).await);
                }
                HookCommand::SessionEnd { dir } => {
                    let dir = working_dir_string(dir);
                    println!("{}", orchestrator.session_end(&dir).await);
                }
                HookCommand::UserPrompt { utterance } => {
                    if let Some(suggestion) = orchestrator.on_user_prompt(&utterance).await {
                        println!("{}", suggestion);
                    }
                }
            }
            Ok(())
        }
    }
}

fn working_dir_string(dir: Option<PathBuf>) -> String {
    dir.or_else(|| std::env::current_dir().ok())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse a deadline given as a date (end of that day, UTC) or a full
/// RFC 3339 timestamp.
fn parse_deadline(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| CtmError::Validation(format!("invalid deadline date '{}'", input)))?;
        return Ok(Utc.from_utc_datetime(&end_of_day));
    }
    DateTime::parse_from_rfc3339(input)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| {
            CtmError::Validation(format!(
                "invalid deadline '{}' (expected YYYY-MM-DD or RFC 3339)",
                input
            ))
            .into()
        })
}

fn parse_bounded(name: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if !(min..=max).contains(&value) {
        return Err(CtmError::Validation(format!(
            "{} must be within [{}, {}], got {}",
            name, min, max, value
        ))
        .into());
    }
    Ok(value)
}

async fn cmd_init(store: &StateStore, config: &CtmConfig) -> Result<()> {
    store.init_layout().await?;
    let config_path = store.root().join(CONFIG_FILE);
    if !config_path.exists() {
        store
            .write_atomic(&config_path, config.to_toml()?.as_bytes())
            .await?;
        println!("initialized {} (default configuration written)", store.root().display());
    } else {
        println!("initialized {}", store.root().display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_spawn(
    store: &StateStore,
    config: &CtmConfig,
    title: String,
    goal: Option<String>,
    project: Option<String>,
    priority: Option<String>,
    deadline: Option<String>,
    tags: Vec<String>,
    blocked_by: Vec<String>,
    parent: Option<String>,
    switch: bool,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(CtmError::Validation("title cannot be empty".to_string()).into());
    }
    let now = Utc::now();

    let level = priority
        .map(|p| PriorityLevel::parse(&p))
        .transpose()?
        .unwrap_or(PriorityLevel::Normal);
    let deadline = deadline.map(|d| parse_deadline(&d)).transpose()?;

    for blocker in &blocked_by {
        if !store.task_exists(blocker).await {
            return Err(CtmError::NotFound(blocker.clone()).into());
        }
    }
    if let Some(parent_id) = &parent {
        if !store.task_exists(parent_id).await {
            return Err(CtmError::NotFound(parent_id.clone()).into());
        }
    }

    // Id collisions are vanishingly rare; retry a few times regardless
    let mut id = generate_task_id();
    for _ in 0..4 {
        if !store.task_exists(&id).await {
            break;
        }
        id = generate_task_id();
    }

    let mut task = Task::new(id.clone(), title.trim(), now);
    task.goal = goal.unwrap_or_default();
    task.context.project = match project {
        Some(project) => project,
        None => working_dir_string(None),
    };
    task.priority.level = level;
    task.timing.deadline = deadline;
    task.tags = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    task.blocked_by = blocked_by;
    task.parent = parent.clone();

    // A blocker that has not completed keeps the new task out of the queue
    let mut blocked = false;
    for blocker in task.blocked_by.clone() {
        let record = store.get_task(&blocker).await?;
        if record.status() != TaskStatus::Completed {
            blocked = true;
        }
    }
    if blocked {
        task.transition(TaskStatus::Blocked)?;
    }

    task.priority.computed_score = scheduler::calculate_priority(&task, now, &config.priority_weights);
    store.put_task(&mut task).await?;

    if let Some(parent_id) = parent {
        let child = id.clone();
        if let Err(e) = store
            .update_task(&parent_id, move |t| {
                if !t.children.contains(&child) {
                    t.children.push(child.clone());
                }
                Ok(())
            })
            .await
        {
            warn!(parent = %parent_id, error = %e, "failed to register child on parent task");
        }
    }

    let mut idx = index::load_or_rebuild(store).await?;
    idx.upsert(&task);
    store.write_state(&store.index_path(), &idx).await?;

    let mut sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    sched.rebuild_queue(now).await?;
    if switch {
        sched.switch_to(&id, now).await?;
    }
    sched.persist().await?;

    if switch {
        println!("spawned task {} (active)", id);
    } else {
        println!("spawned task {}", id);
    }
    Ok(())
}

async fn cmd_switch(store: &StateStore, config: &CtmConfig, id: &str) -> Result<()> {
    let now = Utc::now();
    let mut sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    sched.switch_to(id, now).await?;
    sched.persist().await?;

    let task = store.get_task(id).await?;
    let mut idx = index::load_or_rebuild(store).await?;
    idx.upsert(&task);
    store.write_state(&store.index_path(), &idx).await?;

    println!("switched to task {} ({})", id, task.title);
    Ok(())
}

async fn cmd_status(
    store: &StateStore,
    config: &CtmConfig,
    priority: Option<String>,
    project: Option<String>,
    json: bool,
) -> Result<()> {
    let level = priority.map(|p| PriorityLevel::parse(&p)).transpose()?;
    let idx = index::load_or_rebuild(store).await?;
    let sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    let wm: WorkingMemoryState = store.read_state(&store.working_memory_path()).await?;

    let rows: Vec<(f64, &index::IndexEntry)> = sched
        .get_queue(None)
        .iter()
        .filter_map(|entry| idx.get(&entry.task_id).map(|e| (entry.score, e)))
        .filter(|(_, e)| level.is_none_or(|l| e.level == l))
        .filter(|(_, e)| project.as_deref().is_none_or(|p| e.project == p))
        .collect();

    if json {
        let payload = serde_json::json!({
            "active": sched.get_active(),
            "queue": rows
                .iter()
                .map(|(score, e)| {
                    serde_json::json!({
                        "task_id": e.id,
                        "score": score,
                        "title": e.title,
                        "status": e.status,
                        "level": e.level,
                        "project": e.project,
                        "tags": e.tags,
                    })
                })
                .collect::<Vec<_>>(),
            "working_memory": wm.slots,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match sched.get_active() {
        Some(id) => {
            let title = idx.get(id).map(|e| e.title.as_str()).unwrap_or("?");
            println!("Active: [{}] {}", id, title);
        }
        None => println!("Active: none"),
    }

    if rows.is_empty() {
        println!("Queue: empty");
    } else {
        println!("Queue:");
        for (score, entry) in &rows {
            println!(
                "  {:.3}  [{}] {:<10} {:<9} {}",
                score,
                entry.id,
                entry.level.to_string(),
                entry.status.to_string(),
                truncate_string(&entry.title, 60)
            );
        }
    }

    if wm.slots.is_empty() {
        println!("Working memory: empty");
    } else {
        println!("Working memory ({} tokens):", wm.slots.iter().map(|s| s.token_estimate).sum::<u32>());
        for slot in &wm.slots {
            let title = idx.get(&slot.task_id).map(|e| e.title.as_str()).unwrap_or("?");
            println!(
                "  [{}] {} ({} tokens, {} accesses)",
                slot.task_id, title, slot.token_estimate, slot.access_count
            );
        }
    }
    Ok(())
}

async fn cmd_checkpoint(store: &StateStore, config: &CtmConfig) -> Result<()> {
    let now = Utc::now();
    let mut sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    let Some(active_id) = sched.get_active().map(str::to_string) else {
        return Err(CtmError::Validation("no active task to checkpoint".to_string()).into());
    };
    let task = store.get_task(&active_id).await?;

    let manager = CheckpointManager::new(store.clone(), config.checkpoint_keep, config.context_tail_len);
    let path = manager
        .checkpoint_task(&task, CheckpointKind::Manual, now)
        .await?;
    sched.note_checkpoint();
    sched.persist().await?;

    println!("checkpointed task {} ({})", active_id, path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_context_add(
    store: &StateStore,
    config: &CtmConfig,
    decision: Option<String>,
    learning: Option<String>,
    file: Option<String>,
    deadline: Option<String>,
    urgency: Option<f64>,
    value: Option<f64>,
    signal: Option<f64>,
    blocked_by: Option<String>,
) -> Result<()> {
    if decision.is_none()
        && learning.is_none()
        && file.is_none()
        && deadline.is_none()
        && urgency.is_none()
        && value.is_none()
        && signal.is_none()
        && blocked_by.is_none()
    {
        return Err(CtmError::Validation(
            "nothing to add: pass at least one of --decision, --learning, --file, --deadline, --urgency, --value, --signal, --blocked-by".to_string(),
        )
        .into());
    }

    let now = Utc::now();
    let sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    let Some(active_id) = sched.get_active().map(str::to_string) else {
        return Err(CtmError::Validation("no active task".to_string()).into());
    };

    let deadline = deadline.map(|d| parse_deadline(&d)).transpose()?;
    let urgency = urgency.map(|u| parse_bounded("urgency", u, 0.0, 1.0)).transpose()?;
    let value = value.map(|v| parse_bounded("value", v, 0.0, 1.0)).transpose()?;
    let signal = signal.map(|s| parse_bounded("signal", s, -1.0, 1.0)).transpose()?;

    if let Some(blocker) = &blocked_by {
        if !store.task_exists(blocker).await {
            return Err(CtmError::NotFound(blocker.clone()).into());
        }
        if store
            .would_create_blocker_cycle(&active_id, std::slice::from_ref(blocker))
            .await?
        {
            return Err(CtmError::Validation(format!(
                "blocking {} on {} would create a cycle",
                active_id, blocker
            ))
            .into());
        }
    }

    let task = store
        .update_task(&active_id, move |task| {
            if let Some(text) = &decision {
                task.record_decision(text.clone(), now);
            }
            if let Some(text) = &learning {
                task.record_learning(text.clone(), now);
            }
            if let Some(path) = &file {
                task.record_key_file(path.clone());
            }
            if let Some(deadline) = deadline {
                task.timing.deadline = Some(deadline);
            }
            if let Some(urgency) = urgency {
                task.priority.urgency = urgency;
            }
            if let Some(value) = value {
                task.priority.value = value;
            }
            if let Some(signal) = signal {
                task.priority.user_signal = signal;
            }
            if let Some(blocker) = &blocked_by {
                if !task.blocked_by.contains(blocker) {
                    task.blocked_by.push(blocker.clone());
                }
            }
            Ok(())
        })
        .await?;

    let mut idx = index::load_or_rebuild(store).await?;
    idx.upsert(&task);
    store.write_state(&store.index_path(), &idx).await?;

    println!("updated task {}", active_id);
    Ok(())
}

/// Shared terminal-transition path for `complete` and `cancel`.
async fn cmd_terminal_transition(
    store: &StateStore,
    config: &CtmConfig,
    id: &str,
    to: TaskStatus,
    discard: bool,
) -> Result<()> {
    let now = Utc::now();
    let task = store
        .update_task(id, move |task| {
            // Settle any open activity span before the terminal transition
            if let Some(since) = task.timing.active_since.take() {
                let delta = now.signed_duration_since(since).num_seconds().max(0) as u64;
                task.timing.total_active_seconds += delta;
            }
            task.transition(to)?;
            if to == TaskStatus::Completed {
                task.state.progress_percent = 100;
            }
            Ok(())
        })
        .await?;

    // Terminal tasks leave the queue and working memory immediately
    let mut sched = Scheduler::load(store.clone(), config.priority_weights).await?;
    sched.rebuild_queue(now).await?;
    sched.persist().await?;

    let wm_state: WorkingMemoryState = store.read_state(&store.working_memory_path()).await?;
    let mut wm = working_memory::WorkingMemory::new(
        wm_state,
        config.max_hot_tasks,
        config.token_budget,
        config.context_tail_len,
    );
    wm.evict(id);
    store
        .write_state(&store.working_memory_path(), &wm.into_state())
        .await?;

    // Extraction is best-effort on both terminal paths
    let extractor = Extractor::new(store.clone(), config.dedup_window_days, config.extract_parallelism);
    match extractor.extract_task(&task, now).await {
        Ok(report) => {
            if report.decisions_added + report.learnings_added > 0 {
                println!(
                    "consolidated {} decision(s), {} learning(s)",
                    report.decisions_added, report.learnings_added
                );
            }
        }
        Err(e) => warn!(id, error = %e, "extraction failed on terminal transition"),
    }

    let mut idx = index::load_or_rebuild(store).await?;
    if discard {
        store.delete_task(id).await?;
        idx.remove(id);
    } else {
        idx.upsert(&task);
    }
    store.write_state(&store.index_path(), &idx).await?;

    match to {
        TaskStatus::Completed => println!("completed task {}", id),
        _ if discard => println!("cancelled task {} (record discarded)", id),
        _ => println!("cancelled task {}", id),
    }
    Ok(())
}

async fn cmd_verify(store: &StateStore, id: &str) -> Result<()> {
    let task = store.get_task(id).await?;
    println!("[{}] {}", task.id, task.title);
    if task.acceptance_criteria.is_empty() {
        println!("no acceptance criteria recorded");
    } else {
        for (i, criterion) in task.acceptance_criteria.iter().enumerate() {
            println!("  {}. {}", i + 1, criterion);
        }
    }
    Ok(())
}
