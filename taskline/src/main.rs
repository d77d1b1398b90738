//! Taskline: task tracker CLI with live sync and deadline alerts.
//!
//! Talks to a hosted document platform for auth and task storage, and to
//! the companion functions service for the user directory and 2FA codes.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskline/config.toml`).
//!
//! ```bash
//! # Log in, add a task, list the recent view
//! taskline login --email ada@example.com
//! taskline add "Ship the quarterly report" --priority 4 --due 2026-09-01
//! taskline ls --status pending
//!
//! # Follow the live feed with hourly deadline alerts
//! taskline watch
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

use taskline::api::proxy::FunctionsClient;
use taskline::api::tasks::TasksApi;
use taskline::api::{Backend, BackendConfig};
use taskline::cache::{SessionStore, StoredSession, UserCache};
use taskline::config::{CliArgs, ClientConfig};
use taskline::directory::Directory;
use taskline::notify::Notifier;
use taskline::session::SessionManager;
use taskline::sync::{self, SyncEvent, TaskFeed, WatchConfig, Watcher};
use taskline_core::filter::{AssigneeFilter, DueFilter, PriorityFilter, StatusFilter, TaskFilters};
use taskline_core::stream::task_channel;
use taskline_core::task::{Priority, Task, TaskDraft, TaskId, TaskPatch, TaskStatus};
use taskline_core::user::{UserId, placeholder_label};

/// Environment variable supplying passwords non-interactively.
const PASSWORD_ENV: &str = "TASKLINE_PASSWORD";

type CliError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "taskline")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account (no session; log in afterwards to verify).
    Register {
        /// Email address to register.
        #[arg(long)]
        email: String,
    },
    /// Log in and save the session locally.
    Login {
        /// Email address of the account.
        #[arg(long)]
        email: String,
    },
    /// Delete the saved session and all backend sessions.
    Logout,
    /// Send a password recovery email.
    Recover {
        /// Email address of the account.
        #[arg(long)]
        email: String,
        /// Link target embedded in the recovery email.
        #[arg(long)]
        redirect_url: String,
    },
    /// Complete a recovery with the secret from the email.
    ResetPassword {
        /// Account id from the recovery link.
        #[arg(long)]
        user_id: String,
        /// Secret from the recovery link.
        #[arg(long)]
        secret: String,
    },
    /// Confirm an email verification secret.
    VerifyEmail {
        /// Account id from the verification link.
        #[arg(long)]
        user_id: String,
        /// Secret from the verification link.
        #[arg(long)]
        secret: String,
    },
    /// Re-send the verification email (requires a saved session).
    ResendVerification {
        /// Link target embedded in the verification email.
        #[arg(long)]
        redirect_url: String,
    },
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// Priority, 1 (lowest) to 5 (highest).
        #[arg(long, default_value_t = 1)]
        priority: u8,
        /// Deadline, `YYYY-MM-DD` (local) or RFC 3339.
        #[arg(long)]
        due: Option<String>,
        /// Assignee: an email, a user id, or `me`.
        #[arg(long)]
        assign: Option<String>,
    },
    /// List tasks (the recent view by default).
    Ls {
        /// List every task instead of the recent view.
        #[arg(long)]
        all: bool,
        /// Substring match against title or description.
        #[arg(long)]
        search: Option<String>,
        /// Status: pending, in-progress, completed, cancelled, or all.
        #[arg(long)]
        status: Option<String>,
        /// Priority: 1-5, or all.
        #[arg(long)]
        priority: Option<String>,
        /// Assignee: an email, a user id, `me`, `unassigned`, or all.
        #[arg(long)]
        assignee: Option<String>,
        /// Due bucket: overdue, today, this-week, no-date, future, or all.
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task completed.
    Done {
        /// Task id.
        id: String,
    },
    /// Delete a task.
    Rm {
        /// Task id.
        id: String,
    },
    /// Status summary over every task.
    Stats {
        /// Group the counts per assignee.
        #[arg(long)]
        by_assignee: bool,
    },
    /// Follow the live feed and print deadline alerts.
    Watch {
        /// Watch every task instead of the recent view.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.args.log_level, cli.args.log_file.as_deref());

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging to stderr, or to a file when `--log-file` is set.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match file_path {
        Some(path) => {
            let log_dir = path.parent()?;
            let file_name = path.file_name()?.to_str()?;

            let file_appender = tracing_appender::rolling::never(log_dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_env_filter(env_filter)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(io::stderr)
                .with_env_filter(env_filter)
                .init();
            None
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let cache = Arc::new(UserCache::load(config.users_cache_path()));
    let store = SessionStore::new(config.session_path());

    match command {
        Command::Register { email } => {
            let manager = session_manager(connect_backend(config)?, &cache, config);
            let password = read_new_password()?;
            ensure_password_strength(&password)?;
            let account = manager.register(&email, &password).await?;
            println!(
                "account created for {}; log in to receive the verification email",
                account.email
            );
        }
        Command::Login { email } => {
            let backend = connect_backend(config)?;
            let manager = session_manager(backend.clone(), &cache, config);
            let password = read_password()?;
            let account = manager.login(&email, &password).await?;
            if let Some(secret) = backend.session_secret() {
                store.save(&StoredSession {
                    user_id: account.id.clone(),
                    secret,
                })?;
            } else {
                tracing::warn!("platform withheld the session secret; the session cannot be saved");
            }
            println!("logged in as {}", account.email);
        }
        Command::Logout => {
            let backend = connect_backend(config)?;
            if restore_session(&backend, &store).is_none() {
                tracing::debug!("no saved session; clearing local state only");
            }
            let manager = session_manager(backend, &cache, config);
            manager.logout().await;
            store.clear();
            println!("logged out");
        }
        Command::Recover {
            email,
            redirect_url,
        } => {
            let manager = session_manager(connect_backend(config)?, &cache, config);
            manager.send_recovery(&email, &redirect_url).await?;
            println!("recovery email sent to {email}");
        }
        Command::ResetPassword { user_id, secret } => {
            let manager = session_manager(connect_backend(config)?, &cache, config);
            let password = read_new_password()?;
            ensure_password_strength(&password)?;
            manager.complete_recovery(&user_id, &secret, &password).await?;
            println!("password updated; log in with the new password");
        }
        Command::VerifyEmail { user_id, secret } => {
            let manager = session_manager(connect_backend(config)?, &cache, config);
            manager.verify_email(&user_id, &secret).await?;
            println!("email verified; you can now log in");
        }
        Command::ResendVerification { redirect_url } => {
            let backend = connect_backend(config)?;
            require_session(&backend, &store)?;
            let manager = session_manager(backend, &cache, config);
            manager.resend_verification(&redirect_url).await?;
            println!("verification email sent");
        }
        Command::Add {
            title,
            description,
            priority,
            due,
            assign,
        } => {
            let backend = connect_backend(config)?;
            let session = require_session(&backend, &store)?;
            let directory = build_directory(config, &cache);
            if assign.as_deref().is_some_and(|raw| raw.contains('@')) {
                refresh_directory(directory.as_ref()).await;
            }

            let mut draft = TaskDraft::new(title);
            draft.description = description;
            draft.priority = Priority::new(priority)?;
            if let Some(raw) = due {
                draft.due_date = Some(parse_due(&raw)?);
            }
            if let Some(raw) = assign {
                draft.assigned_to = Some(resolve_assignee(&raw, directory.as_ref(), &cache, &session)?);
            }
            draft.validate()?;

            let task = backend.create_task(&draft).await?;
            println!("created {} ({})", task.title, task.id);
        }
        Command::Ls {
            all,
            search,
            status,
            priority,
            assignee,
            due,
        } => {
            let backend = connect_backend(config)?;
            let session = require_session(&backend, &store)?;
            let directory = build_directory(config, &cache);
            refresh_directory(directory.as_ref()).await;

            let mut filters = TaskFilters::default();
            if let Some(term) = search {
                filters.search = term;
            }
            if let Some(raw) = status {
                filters.status = parse_status_filter(&raw)?;
            }
            if let Some(raw) = priority {
                filters.priority = parse_priority_filter(&raw)?;
            }
            if let Some(raw) = assignee {
                filters.assignee = parse_assignee_filter(&raw, directory.as_ref(), &cache, &session)?;
            }
            if let Some(raw) = due {
                filters.due = parse_due_filter(&raw)?;
            }

            let tasks = if all {
                backend.all_tasks().await?
            } else {
                backend.recent_tasks(config.page_size).await?
            };

            let now = Local::now();
            let visible = filters.apply(&tasks, &now);
            for task in &visible {
                println!("{}", render_task(task, directory.as_ref(), &cache));
            }
            if filters.active_count() > 0 {
                println!(
                    "{} of {} task(s) shown ({} filter(s) active)",
                    visible.len(),
                    tasks.len(),
                    filters.active_count()
                );
            } else if visible.is_empty() {
                println!("no tasks");
            }
        }
        Command::Done { id } => {
            let backend = connect_backend(config)?;
            require_session(&backend, &store)?;
            let patch = TaskPatch {
                status: Some(TaskStatus::Completed),
                ..TaskPatch::default()
            };
            let task = backend.update_task(&TaskId::new(id), &patch).await?;
            println!("completed {} ({})", task.title, task.id);
        }
        Command::Rm { id } => {
            let backend = connect_backend(config)?;
            require_session(&backend, &store)?;
            let id = TaskId::new(id);
            backend.delete_task(&id).await?;
            println!("deleted {id}");
        }
        Command::Stats { by_assignee } => {
            let backend = connect_backend(config)?;
            require_session(&backend, &store)?;
            let tasks = backend.all_tasks().await?;
            if by_assignee {
                let directory = build_directory(config, &cache);
                refresh_directory(directory.as_ref()).await;
                print_stats_by_assignee(&tasks, directory.as_ref(), &cache);
            } else {
                print_stats(&tasks);
            }
        }
        Command::Watch { all } => {
            let backend = connect_backend(config)?;
            let session = require_session(&backend, &store)?;
            watch(config, backend, &cache, session, all).await?;
        }
    }
    Ok(())
}

/// Live feed loop: snapshots to stdout, deadline alerts as log lines.
async fn watch(
    config: &ClientConfig,
    backend: Backend,
    cache: &Arc<UserCache>,
    session: StoredSession,
    all: bool,
) -> Result<(), CliError> {
    let channel = task_channel(&config.database_id, &config.tasks_collection_id);
    let watch_config = WatchConfig::new(config.require_endpoint()?, config.require_project()?, channel);
    let watcher = Watcher::connect(&watch_config).await?;

    let directory = build_directory(config, cache);
    refresh_directory(directory.as_ref()).await;

    let feed = if all {
        TaskFeed::unbounded()
    } else {
        TaskFeed::recent(config.page_size)
    };
    let mut handle = sync::spawn(backend, watcher, feed);
    let mut notifier = Notifier::new(session.user_id, config.notify_interval);

    loop {
        tokio::select! {
            event = handle.next() => match event {
                Some(SyncEvent::Snapshot(tasks)) => {
                    println!("-- {} task(s) --", tasks.len());
                    for task in &tasks {
                        println!("{}", render_task(task, directory.as_ref(), cache));
                    }
                    notifier.update_tasks(tasks);
                }
                Some(SyncEvent::Connected) => {
                    tracing::info!("live feed connected");
                }
                Some(SyncEvent::Error(message)) => {
                    tracing::warn!(error = %message, "live feed error");
                }
                Some(SyncEvent::Disconnected) | None => {
                    tracing::warn!("live feed disconnected");
                    break;
                }
            },
            alerts = notifier.tick() => {
                for alert in &alerts {
                    tracing::info!(
                        task_id = %alert.task_id,
                        kind = alert.kind.key(),
                        "{}",
                        alert.message
                    );
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

fn connect_backend(config: &ClientConfig) -> Result<Backend, CliError> {
    let backend_config = BackendConfig::new(
        config.require_endpoint()?,
        config.require_project()?,
        &config.database_id,
        &config.tasks_collection_id,
    );
    Ok(Backend::connect(&backend_config)?)
}

fn session_manager(
    backend: Backend,
    cache: &Arc<UserCache>,
    config: &ClientConfig,
) -> SessionManager<Backend> {
    SessionManager::new(
        backend,
        Arc::clone(cache),
        config.verify_url.clone().unwrap_or_default(),
    )
}

/// Loads the saved session into the backend, if one exists.
fn restore_session(backend: &Backend, store: &SessionStore) -> Option<StoredSession> {
    let session = store.load()?;
    backend.restore_session(session.secret.clone());
    Some(session)
}

fn require_session(backend: &Backend, store: &SessionStore) -> Result<StoredSession, CliError> {
    restore_session(backend, store).ok_or_else(|| "not logged in (run `taskline login` first)".into())
}

fn build_directory(
    config: &ClientConfig,
    cache: &Arc<UserCache>,
) -> Option<Directory<FunctionsClient>> {
    let base = config.functions_url.as_deref()?;
    match FunctionsClient::new(base) {
        Ok(client) => Some(Directory::new(client, Arc::clone(cache))),
        Err(e) => {
            tracing::warn!(err = %e, "functions service misconfigured; assignee names fall back to the cache");
            None
        }
    }
}

async fn refresh_directory(directory: Option<&Directory<FunctionsClient>>) {
    if let Some(directory) = directory
        && let Err(e) = directory.refresh().await
    {
        tracing::warn!(err = %e, "user directory refresh failed; using cached names");
    }
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

/// Reads a password from `TASKLINE_PASSWORD` or an interactive prompt.
fn read_password() -> Result<String, CliError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    prompt_line("password")
}

/// Like [`read_password`], with a confirmation prompt when interactive.
fn read_new_password() -> Result<String, CliError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let password = prompt_line("password")?;
    let confirm = prompt_line("confirm password")?;
    if password != confirm {
        return Err("passwords do not match".into());
    }
    Ok(password)
}

fn prompt_line(label: &str) -> Result<String, CliError> {
    eprint!("{label}: ");
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    if line.is_empty() {
        return Err("stdin closed before input was entered".into());
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn ensure_password_strength(password: &str) -> Result<(), CliError> {
    if password.chars().count() < 8 {
        return Err("password must be at least 8 characters".into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parses a deadline: a bare date is taken as local midnight.
fn parse_due(raw: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid due date `{raw}` (expected YYYY-MM-DD or RFC 3339)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid due date `{raw}`"))?;
    let local = Local
        .from_local_datetime(&midnight)
        .earliest()
        .ok_or_else(|| format!("due date `{raw}` falls in a local-time gap"))?;
    Ok(local.with_timezone(&Utc))
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, CliError> {
    if raw == "all" {
        return Ok(StatusFilter::All);
    }
    TaskStatus::parse(raw).map(StatusFilter::Only).ok_or_else(|| {
        format!("unknown status `{raw}` (pending, in-progress, completed, cancelled, all)").into()
    })
}

fn parse_priority_filter(raw: &str) -> Result<PriorityFilter, CliError> {
    if raw == "all" {
        return Ok(PriorityFilter::All);
    }
    let value: u8 = raw
        .parse()
        .map_err(|_| format!("unknown priority `{raw}` (1-5 or all)"))?;
    Ok(PriorityFilter::Only(Priority::new(value)?))
}

fn parse_due_filter(raw: &str) -> Result<DueFilter, CliError> {
    match raw {
        "all" => Ok(DueFilter::All),
        "overdue" => Ok(DueFilter::Overdue),
        "today" => Ok(DueFilter::Today),
        "this-week" => Ok(DueFilter::ThisWeek),
        "no-date" => Ok(DueFilter::NoDate),
        "future" => Ok(DueFilter::Future),
        _ => Err(format!(
            "unknown due bucket `{raw}` (overdue, today, this-week, no-date, future, all)"
        )
        .into()),
    }
}

fn parse_assignee_filter(
    raw: &str,
    directory: Option<&Directory<FunctionsClient>>,
    cache: &UserCache,
    session: &StoredSession,
) -> Result<AssigneeFilter, CliError> {
    match raw {
        "all" => Ok(AssigneeFilter::All),
        "unassigned" => Ok(AssigneeFilter::Unassigned),
        _ => Ok(AssigneeFilter::User(resolve_assignee(
            raw, directory, cache, session,
        )?)),
    }
}

/// Resolves an assignee argument: `me`, an email, or a raw user id.
fn resolve_assignee(
    raw: &str,
    directory: Option<&Directory<FunctionsClient>>,
    cache: &UserCache,
    session: &StoredSession,
) -> Result<UserId, CliError> {
    if raw == "me" {
        return Ok(session.user_id.clone());
    }
    if raw.contains('@') {
        if let Some(directory) = directory {
            if let Some(user) = directory.find_by_email(raw) {
                return Ok(user.id);
            }
        } else if let Some(cached) = cache.find_by_email(raw) {
            return Ok(cached.id);
        }
        return Err(format!("no known user with email `{raw}`").into());
    }
    Ok(UserId::new(raw))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn assignee_label(
    directory: Option<&Directory<FunctionsClient>>,
    cache: &UserCache,
    id: &UserId,
) -> String {
    match directory {
        Some(directory) => directory.label(id),
        None => cache
            .get(id)
            .map_or_else(|| placeholder_label(id), |cached| cached.to_user().label()),
    }
}

fn render_task(
    task: &Task,
    directory: Option<&Directory<FunctionsClient>>,
    cache: &UserCache,
) -> String {
    let due = task.due_date.map_or_else(
        || "-".to_string(),
        |due| due.with_timezone(&Local).format("%Y-%m-%d").to_string(),
    );
    let assignee = task.assigned_to.as_ref().map_or_else(
        || "-".to_string(),
        |id| assignee_label(directory, cache, id),
    );
    format!(
        "{:<22}  {:<11}  p{}  {:<10}  {:<30}  {}",
        task.id,
        task.status.as_str(),
        task.priority,
        due,
        assignee,
        task.title
    )
}

#[derive(Default)]
struct StatusCounts {
    pending: usize,
    in_progress: usize,
    completed: usize,
    cancelled: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    fn line(&self) -> String {
        format!(
            "pending {}, in-progress {}, completed {}, cancelled {}",
            self.pending, self.in_progress, self.completed, self.cancelled
        )
    }
}

fn print_stats(tasks: &[Task]) {
    let mut counts = StatusCounts::default();
    for task in tasks {
        counts.add(task.status);
    }
    println!("pending      {}", counts.pending);
    println!("in-progress  {}", counts.in_progress);
    println!("completed    {}", counts.completed);
    println!("cancelled    {}", counts.cancelled);
    println!("total        {}", tasks.len());
}

fn print_stats_by_assignee(
    tasks: &[Task],
    directory: Option<&Directory<FunctionsClient>>,
    cache: &UserCache,
) {
    let mut groups: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for task in tasks {
        let label = task.assigned_to.as_ref().map_or_else(
            || "(unassigned)".to_string(),
            |id| assignee_label(directory, cache, id),
        );
        groups.entry(label).or_default().add(task.status);
    }
    for (label, counts) in &groups {
        println!("{label}: {}", counts.line());
    }
}
