use clap::{CommandFactory, Parser};
use routine_core::clock;
use routine_core::config::{self, Palette};
use routine_core::error::AppError;
use routine_core::model::{Task, TaskCompletion};
use routine_core::task_api::{self, HistoryEntry, NewTask, TaskUpdate};
use routine_cli::cli::{Cli, Command, collect_config_overrides};
use std::io::{self, BufRead};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::Date;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Recurrence")]
    recurrence: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Completed At")]
    completed_at: String,
}

fn window_label(task: &Task) -> String {
    format!(
        "{}-{}",
        clock::format_clock_time(task.start_time),
        clock::format_clock_time(task.end_time)
    )
}

fn task_label(task: &Task) -> String {
    format!(
        "{} ({}) {} {}",
        task.name,
        task.id,
        clock::format_calendar_date(task.date()),
        window_label(task)
    )
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::invalid_data(err.to_string()))
}

fn print_task_json(task: &Task) -> Result<(), AppError> {
    println!("{}", to_json(task)?);
    Ok(())
}

fn print_tasks_plain(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }

    let rows: Vec<TaskRow> = tasks
        .iter()
        .map(|task| TaskRow {
            id: task.id.clone(),
            name: task.name.clone(),
            date: clock::format_calendar_date(task.date()),
            window: window_label(task),
            priority: task.priority.to_string(),
            recurrence: task.recurrence.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");
}

fn print_task_details(task: &Task, palette: &Palette) {
    println!("{}", palette.accentize(&task.name));
    println!("  id:          {}", palette.mutedize(&task.id));
    println!("  date:        {}", clock::format_calendar_date(task.date()));
    println!("  window:      {}", window_label(task));
    println!("  priority:    {}", task.priority);
    println!("  recurrence:  {}", task.recurrence);
    if let Some(description) = task.description.as_deref() {
        println!("  description: {}", description);
    }
}

fn completion_time_label(record: &TaskCompletion) -> Result<String, AppError> {
    match record.completed_at {
        Some(value) => value
            .format(&Rfc3339)
            .map_err(|err| AppError::invalid_data(err.to_string())),
        None => Ok("-".to_string()),
    }
}

fn history_json(entries: &[HistoryEntry]) -> Result<serde_json::Value, AppError> {
    let mut payload = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut value = to_json(&entry.completion)?;
        value["task_name"] = serde_json::json!(entry.task_name);
        payload.push(value);
    }
    Ok(serde_json::Value::Array(payload))
}

fn print_history_plain(entries: &[HistoryEntry]) -> Result<(), AppError> {
    if entries.is_empty() {
        println!("No completions yet.");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        rows.push(HistoryRow {
            date: clock::format_calendar_date(entry.completion.date),
            task: entry
                .task_name
                .clone()
                .unwrap_or_else(|| entry.completion.task_id.clone()),
            status: if entry.completion.is_completed() {
                "completed".to_string()
            } else {
                "not completed".to_string()
            },
            completed_at: completion_time_label(&entry.completion)?,
        });
    }
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");
    Ok(())
}

fn error_json(err: &AppError) -> Result<serde_json::Value, AppError> {
    let mut error = serde_json::json!({
        "code": err.code(),
        "message": err.message(),
    });
    if !err.conflicts().is_empty() {
        error["conflicts"] = to_json(&err.conflicts())?;
    }
    Ok(serde_json::json!({ "error": error }))
}

fn report_error(err: &AppError, json: bool) {
    if !err.is_client_error() {
        tracing::error!(code = err.code(), error = %err, "request failed");
    }
    if !json {
        eprintln!("ERROR: {}", err);
        return;
    }
    match error_json(err) {
        Ok(value) => println!("{}", value),
        Err(encode_err) => {
            eprintln!("ERROR: {}", err);
            eprintln!("ERROR: {}", encode_err);
        }
    }
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn date_or_today(raw: Option<&str>) -> Result<Date, AppError> {
    match raw {
        Some(value) => clock::parse_calendar_date(value),
        None => Ok(clock::today(clock::local_offset())),
    }
}

fn optional_date(raw: Option<&str>) -> Result<Option<Date>, AppError> {
    raw.map(clock::parse_calendar_date).transpose()
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error.as_ref() {
        tracing::warn!(error = %err, "ignoring unreadable config file");
    }
    let overrides =
        collect_config_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    let settings = config::merge_overrides(&loaded.config, &overrides);
    let palette = settings.theme().palette();
    let owner = config::resolve_owner(cli.owner.as_deref(), &settings)?;

    match cli.command {
        Command::Add {
            name,
            start,
            end,
            date,
            priority,
            recurrence,
            description,
        } => {
            let name = match name {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::invalid_input("name is required")),
            };
            let new_task = NewTask {
                name,
                description,
                priority: priority.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
                recurrence: recurrence
                    .as_deref()
                    .map(str::parse)
                    .transpose()?
                    .unwrap_or_default(),
                date: date_or_today(date.as_deref())?,
                start,
                end,
                offset: clock::local_offset(),
            };

            let task = task_api::create_task(&owner, &new_task)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Added task: {}", palette.accentize(&task_label(&task)));
            }
        }
        Command::Check {
            start,
            end,
            date,
            exclude,
        } => {
            let date = match (date.as_deref(), exclude.as_deref()) {
                (Some(value), _) => clock::parse_calendar_date(value)?,
                (None, Some(id)) => task_api::get_task(&owner, id)?.date(),
                (None, None) => clock::today(clock::local_offset()),
            };

            let interval =
                task_api::validate_new_interval(&owner, date, &start, &end, exclude.as_deref())?;
            if cli.json {
                let start_time = interval
                    .start()
                    .format(&Rfc3339)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?;
                let end_time = interval
                    .end()
                    .format(&Rfc3339)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?;
                println!(
                    "{}",
                    serde_json::json!({
                        "start_time": start_time,
                        "end_time": end_time,
                        "duration_minutes": interval.duration().whole_minutes(),
                    })
                );
            } else {
                println!(
                    "Available: {} {}-{}",
                    clock::format_calendar_date(date),
                    clock::format_clock_time(interval.start()),
                    clock::format_clock_time(interval.end())
                );
            }
        }
        Command::List { date } => {
            let tasks = task_api::list_tasks(&owner, optional_date(date.as_deref())?)?;
            if cli.json {
                println!("{}", to_json(&tasks)?);
            } else {
                print_tasks_plain(&tasks);
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(&owner, &id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                print_task_details(&task, &palette);
            }
        }
        Command::Edit {
            id,
            name,
            description,
            priority,
            recurrence,
            start,
            end,
            date,
        } => {
            let update = TaskUpdate {
                name,
                description,
                priority: priority.as_deref().map(str::parse).transpose()?,
                recurrence: recurrence.as_deref().map(str::parse).transpose()?,
                date: optional_date(date.as_deref())?,
                start,
                end,
            };

            let task = task_api::update_task(&owner, &id, &update)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Updated task: {}", palette.accentize(&task_label(&task)));
            }
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(&owner, &id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!(
                    "Deleted task: {} {}",
                    task.name,
                    palette.mutedize(&format!("({})", task.id))
                );
            }
        }
        Command::Done { id, date } => {
            let date = date_or_today(date.as_deref())?;
            let record = task_api::mark_completed(&id, &owner, date)?;
            if cli.json {
                println!("{}", to_json(&record)?);
            } else {
                println!(
                    "Completed task: {} on {}",
                    record.task_id,
                    palette.accentize(&clock::format_calendar_date(record.date))
                );
            }
        }
        Command::History => {
            let entries = task_api::task_history(&owner)?;
            if cli.json {
                println!("{}", history_json(&entries)?);
            } else {
                print_history_plain(&entries)?;
            }
        }
        Command::Summary { date } => {
            let summary = task_api::daily_summary(&owner, date_or_today(date.as_deref())?)?;
            let day = clock::format_calendar_date(summary.date);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "date": day,
                        "total_tasks": summary.total_tasks,
                        "completed_tasks": summary.completed_tasks,
                    })
                );
            } else {
                println!(
                    "{}: {} of {} tasks completed",
                    day,
                    palette.accentize(&summary.completed_tasks.to_string()),
                    summary.total_tasks
                );
            }
        }
    }

    Ok(())
}

fn run_interactive() -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::storage(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("routine".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        let json = cli.json;
        if let Err(err) = run_command(cli) {
            report_error(&err, json);
        }
    }

    Ok(())
}

fn init_tracing() {
    // Opt-in via RUST_LOG; unparsable filters fall back to silence.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive() {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            // --help and --version
            let _ = err.print();
            return;
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let json = cli.json;
    if let Err(err) = run_command(cli) {
        report_error(&err, json);
        std::process::exit(1);
    }
}
