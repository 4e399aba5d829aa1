//! App Model demo - registers the File/Edit actions headlessly and prints
//! what a rendering backend would draw.

mod actions;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use appmodel_api::{KeyBinding, MenuNode, OperatingSystem, Value};
use appmodel_kernel::{AppConfig, Application, Applications, Args};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use actions::Clipboard;

#[derive(Parser, Debug)]
#[command(name = "appmodel-demo")]
#[command(about = "Register demo actions and resolve menus and keybindings", long_about = None)]
struct Cli {
    /// Log registry activity at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Platform to resolve keybindings for (default: the running OS)
    #[arg(long, value_enum)]
    platform: Option<Platform>,

    /// JSON application config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Text to put in the `selection` context key
    #[arg(long)]
    select: Option<String>,

    /// Key presses to dispatch in order, e.g. `--press Ctrl+O --press Ctrl+W`
    #[arg(long = "press", value_name = "KEYS")]
    presses: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Platform {
    Linux,
    Mac,
    Windows,
}

impl From<Platform> for OperatingSystem {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Linux => OperatingSystem::Linux,
            Platform::Mac => OperatingSystem::Mac,
            Platform::Windows => OperatingSystem::Windows,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            AppConfig::from_json(&text)?
        }
        None => AppConfig::default(),
    };
    if let Some(platform) = cli.platform {
        config.platform = Some(platform.into());
    }

    let apps = Applications::new();
    let app = apps.create("demo", config)?;
    tracing::info!(app = app.name(), platform = ?app.platform(), "starting demo");

    app.add_disposer(app.injection_store().register_value(Clipboard::default()));
    app.add_disposer(app.injection_store().register_value(app.context().clone()));
    app.register_actions(actions::all())?;

    if let Some(selection) = &cli.select {
        app.context().set("selection", selection.as_str());
    }

    print_menus(&app)?;

    for press in &cli.presses {
        dispatch(&app, press)?;
    }
    if !cli.presses.is_empty() {
        print_menus(&app)?;
    }

    apps.destroy("demo");
    Ok(())
}

fn print_menus(app: &Application) -> Result<()> {
    for menu_id in [actions::FILE_MENU, actions::EDIT_MENU] {
        println!("[{}]", menu_id);
        let nodes = app.resolve_menu(menu_id)?;
        print_nodes(app, &nodes, 1);
    }
    Ok(())
}

fn print_nodes(app: &Application, nodes: &[MenuNode], depth: usize) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            MenuNode::Separator => println!("{}----", indent),
            MenuNode::Command { item, enabled, checked } => {
                let shortcut = app
                    .keybindings()
                    .get_keybinding_for_command(&item.command.id)
                    .map(|k| k.binding.display_for(app.platform()))
                    .unwrap_or_default();
                let mark = match checked {
                    Some(true) => "[x] ",
                    Some(false) => "[ ] ",
                    None => "",
                };
                let state = if *enabled { "" } else { " (disabled)" };
                println!("{}{}{:<12}{:>10}{}", indent, mark, item.command.title, shortcut, state);
            }
            MenuNode::Submenu { item, children, .. } => {
                println!("{}{} >", indent, item.title);
                print_nodes(app, children, depth + 1);
            }
        }
    }
}

fn dispatch(app: &Application, press: &str) -> Result<()> {
    let binding = KeyBinding::parse_for(press, app.platform())
        .with_context(|| format!("invalid key press {:?}", press))?;
    let Some(command) = app.resolve_keybinding(&binding) else {
        println!("{}: unbound", press);
        return Ok(());
    };
    match app.execute_command(&command, Args::new()) {
        Ok(future) => match future.wait() {
            Ok(Value::Null) => println!("{} -> {}", press, command),
            Ok(value) => println!("{} -> {}: {}", press, command, serde_json::to_string(&value)?),
            Err(e) => println!("{} -> {} failed: {}", press, command, e),
        },
        Err(e) => println!("{} -> {}", press, e),
    }
    Ok(())
}
