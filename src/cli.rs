//! CLI module
//!
//! This module provides the command-line interface for orbitask: a `serve`
//! command that hosts the engine and a set of commands that talk to a running
//! server over HTTP.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use colored::Colorize;
use serde_json::{json, Map, Value};

use crate::{
    api::{serve, Client, ClientConfig, HttpClientImpl, ServerConfig},
    asteroids::AsteroidAction,
    engine::{example_drafts, Core, Engine, EngineConfig, Snapshot},
    models::{SettingsPatch, Subtask, Task},
    store::{JsonFileStore, MemoryStore, Store},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(
        short,
        long,
        env = "ORBITASK_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orbitask API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Directory holding tasks.json and settings.json. Without it nothing is persisted.
        #[arg(long, env = "ORBITASK_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Seed for orbit jitter and asteroid spawning
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet period before a hierarchy rebuild, in milliseconds
        #[arg(long, default_value_t = 1000)]
        debounce_ms: u64,

        /// Populate an empty store with example tasks
        #[arg(long)]
        example: bool,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Subtask management commands
    Subtask {
        #[command(subcommand)]
        command: SubtaskCommands,
    },

    /// Print the current hierarchy
    Snapshot,

    /// Show or change settings
    Settings {
        /// Group tasks into one system per category
        #[arg(long)]
        grouping: Option<bool>,

        /// Animation speed multiplier (clamped to 0.1..=5.0)
        #[arg(long)]
        speed: Option<f64>,

        /// Draw orbit rings
        #[arg(long)]
        orbits: Option<bool>,
    },

    /// Focus a system, or clear the focus when no id is given
    Focus {
        system_id: Option<String>,
    },

    /// Accept or reject an asteroid suggestion
    Asteroid {
        #[command(subcommand)]
        command: AsteroidCommands,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
}

impl PriorityArg {
    fn as_str(self) -> &'static str {
        match self {
            PriorityArg::Low => "low",
            PriorityArg::Medium => "medium",
            PriorityArg::High => "high",
        }
    }
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List all tasks
    List,

    /// Add a new task
    Add {
        /// Task text
        text: String,

        /// Category key (work, personal, study, ...)
        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long, value_enum)]
        priority: Option<PriorityArg>,

        /// Deadline as YYYY-MM-DD or RFC 3339
        #[arg(short, long)]
        deadline: Option<String>,

        /// Keyword to attach; repeat for more
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
    },

    /// Update fields of a task
    Update {
        task_id: String,

        #[arg(long)]
        text: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long, value_enum)]
        priority: Option<PriorityArg>,

        /// Deadline as YYYY-MM-DD or RFC 3339; pass "none" to clear it
        #[arg(short, long)]
        deadline: Option<String>,
    },

    /// Delete a task and its subtasks
    Delete { task_id: String },

    /// Flip the completed flag of a task
    Toggle { task_id: String },
}

#[derive(Subcommand)]
enum SubtaskCommands {
    /// Add a subtask to a task
    Add {
        task_id: String,

        text: String,

        /// Deadline as YYYY-MM-DD or RFC 3339
        #[arg(short, long)]
        deadline: Option<String>,
    },

    /// Flip the completed flag of a subtask
    Toggle { task_id: String, subtask_id: String },

    /// Delete a subtask
    Delete { task_id: String, subtask_id: String },
}

#[derive(Subcommand)]
enum AsteroidCommands {
    Accept { asteroid_id: String },
    Reject { asteroid_id: String },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            data_dir,
            seed,
            debounce_ms,
            example,
        } => {
            println!("Starting orbitask API server on port {}...", port);

            let store: Box<dyn Store> = match data_dir {
                Some(dir) => {
                    println!("Persisting to {}", dir.display());
                    Box::new(JsonFileStore::new(dir.clone()))
                }
                None => Box::new(MemoryStore::new()),
            };
            let config = EngineConfig {
                debounce: Duration::from_millis(*debounce_ms),
                seed: *seed,
            };
            let mut engine = Engine::new(store, config);

            if *example && engine.tasks().is_empty() {
                println!("Populating with example tasks...");
                for draft in example_drafts(Utc::now()) {
                    engine.add_task(draft);
                }
                engine.flush(Utc::now());
            }

            let core = Core::new(engine);
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            serve(core, config).await?;
            Ok(())
        }

        Commands::Task { command } => {
            let client = create_client(&cli.server);
            match command {
                TaskCommands::List => {
                    let tasks = client.list_tasks().await?;
                    if tasks.is_empty() {
                        println!("No tasks yet. Add some with 'orbitask task add'");
                    }
                    for task in &tasks {
                        print_task(task);
                    }
                }

                TaskCommands::Add {
                    text,
                    category,
                    priority,
                    deadline,
                    keywords,
                } => {
                    let mut draft = Map::new();
                    draft.insert("text".into(), json!(text));
                    insert_opt(&mut draft, "category", category.as_deref());
                    insert_opt(&mut draft, "priority", priority.map(PriorityArg::as_str));
                    insert_opt(&mut draft, "deadline", deadline.as_deref());
                    if !keywords.is_empty() {
                        draft.insert("keywords".into(), json!(keywords));
                    }

                    let task = client.add_task(Value::Object(draft)).await?;
                    println!("Added task {}", task.id.bold());
                    print_task(&task);
                }

                TaskCommands::Update {
                    task_id,
                    text,
                    category,
                    priority,
                    deadline,
                } => {
                    let mut patch = Map::new();
                    insert_opt(&mut patch, "text", text.as_deref());
                    insert_opt(&mut patch, "category", category.as_deref());
                    insert_opt(&mut patch, "priority", priority.map(PriorityArg::as_str));
                    match deadline.as_deref() {
                        Some("none") => {
                            patch.insert("deadline".into(), Value::Null);
                        }
                        other => insert_opt(&mut patch, "deadline", other),
                    }

                    let task = client.update_task(task_id, Value::Object(patch)).await?;
                    println!("Updated task {}", task.id.bold());
                    print_task(&task);
                }

                TaskCommands::Delete { task_id } => {
                    let task = client.delete_task(task_id).await?;
                    println!("Deleted task \"{}\"", task.text);
                }

                TaskCommands::Toggle { task_id } => {
                    let task = client.toggle_task(task_id).await?;
                    print_task(&task);
                }
            }
            Ok(())
        }

        Commands::Subtask { command } => {
            let client = create_client(&cli.server);
            match command {
                SubtaskCommands::Add {
                    task_id,
                    text,
                    deadline,
                } => {
                    let mut draft = Map::new();
                    draft.insert("text".into(), json!(text));
                    insert_opt(&mut draft, "deadline", deadline.as_deref());

                    let subtask = client.add_subtask(task_id, Value::Object(draft)).await?;
                    println!("Added subtask {} to {}", subtask.id.bold(), task_id);
                }

                SubtaskCommands::Toggle {
                    task_id,
                    subtask_id,
                } => {
                    let subtask = client.toggle_subtask(task_id, subtask_id).await?;
                    print_subtask(&subtask, "  ");
                }

                SubtaskCommands::Delete {
                    task_id,
                    subtask_id,
                } => {
                    let subtask = client.delete_subtask(task_id, subtask_id).await?;
                    println!("Deleted subtask \"{}\"", subtask.text);
                }
            }
            Ok(())
        }

        Commands::Snapshot => {
            let client = create_client(&cli.server);
            let snapshot = client.snapshot().await?;
            print_snapshot(&snapshot);
            Ok(())
        }

        Commands::Settings {
            grouping,
            speed,
            orbits,
        } => {
            let client = create_client(&cli.server);
            let patch = SettingsPatch {
                grouping_enabled: *grouping,
                animation_speed: *speed,
                show_orbits: *orbits,
            };
            let settings = if patch == SettingsPatch::default() {
                client.settings().await?
            } else {
                client.update_settings(patch).await?
            };

            println!("Settings:");
            println!("  Grouping: {}", settings.grouping_enabled);
            println!("  Animation speed: {:.1}x", settings.animation_speed);
            println!("  Show orbits: {}", settings.show_orbits);
            println!(
                "  Focused system: {}",
                settings.focused_system_id.as_deref().unwrap_or("none")
            );
            Ok(())
        }

        Commands::Focus { system_id } => {
            let client = create_client(&cli.server);
            let focused = client.focus_system(system_id.clone()).await?;
            println!(
                "{}",
                focus_message(system_id.as_deref(), focused.as_deref())
            );
            Ok(())
        }

        Commands::Asteroid { command } => {
            let client = create_client(&cli.server);
            let (asteroid_id, action) = match command {
                AsteroidCommands::Accept { asteroid_id } => (asteroid_id, AsteroidAction::Accept),
                AsteroidCommands::Reject { asteroid_id } => (asteroid_id, AsteroidAction::Reject),
            };
            let outcome = client.asteroid_action(asteroid_id, action).await?;
            let verb = match outcome.action {
                AsteroidAction::Accept => "Accepted".green(),
                AsteroidAction::Reject => "Rejected".red(),
            };
            println!("{} \"{}\"", verb, outcome.suggestion);
            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server_url: &str) -> HttpClientImpl {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    HttpClientImpl::with_config(config)
}

/// Describes the result of a focus request. The server keeps the previous
/// focus when asked for an unknown system.
fn focus_message(requested: Option<&str>, focused: Option<&str>) -> String {
    match (requested, focused) {
        (Some(id), Some(current)) if id == current => format!("Focused {}", current),
        (Some(id), current) => format!(
            "Unknown system '{}'; focus unchanged ({}). Run 'orbitask snapshot' for ids.",
            id,
            current.unwrap_or("none")
        ),
        (None, _) => "Focus cleared".to_string(),
    }
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), json!(value));
    }
}

fn check(completed: bool) -> &'static str {
    if completed {
        "[x]"
    } else {
        "[ ]"
    }
}

fn print_task(task: &Task) {
    let deadline = task
        .deadline
        .map(|d| format!(" due {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    println!(
        "{} {} ({}, {:?}{}) {}",
        check(task.completed),
        task.text,
        task.category,
        task.priority,
        deadline,
        task.id.dimmed()
    );
    for subtask in &task.subtasks {
        print_subtask(subtask, "    ");
    }
}

fn print_subtask(subtask: &Subtask, indent: &str) {
    println!(
        "{}{} {} {}",
        indent,
        check(subtask.completed),
        subtask.text,
        subtask.id.dimmed()
    );
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "Snapshot v{} built at {}",
        snapshot.version,
        snapshot.built_at.format("%Y-%m-%d %H:%M:%S")
    );

    if snapshot.systems.is_empty() {
        println!("  No systems. Add tasks with 'orbitask task add' or enable grouping.");
    }

    for system in &snapshot.systems {
        println!(
            "\n{} {} ({} tasks) {}",
            "☀".yellow(),
            system.name.bold(),
            system.sun.task_count,
            system.id.dimmed()
        );
        for planet in &system.planets {
            let name = if planet.completed {
                planet.name.strikethrough()
            } else {
                planet.name.color(planet.urgency.color())
            };
            println!("  ● {} [{:?}]", name, planet.urgency);
            for satellite in &planet.satellites {
                println!(
                    "      ∘ {}",
                    satellite.name.color(satellite.urgency.color())
                );
            }
        }
    }

    if !snapshot.asteroids.is_empty() {
        println!("\nAsteroids:");
        for asteroid in &snapshot.asteroids {
            println!(
                "  {} \"{}\" → {} {}",
                "☄".cyan(),
                asteroid.action,
                asteroid.target.body_id,
                asteroid.id.dimmed()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_focus_message_for_known_system() {
        assert_eq!(
            focus_message(Some("system-work"), Some("system-work")),
            "Focused system-work"
        );
    }

    #[test]
    fn test_unknown_system_keeps_previous_focus() {
        let message = focus_message(Some("bogus"), Some("system-work"));
        assert!(message.starts_with("Unknown system 'bogus'"));
        assert!(message.contains("focus unchanged (system-work)"));
        assert!(!message.contains("cleared"));

        let message = focus_message(Some("bogus"), None);
        assert!(message.contains("focus unchanged (none)"));
        assert!(!message.contains("cleared"));
    }

    #[test]
    fn test_focus_without_id_clears() {
        assert_eq!(focus_message(None, None), "Focus cleared");
    }
}
