//! Offline tooling for sheetsync templates.
//!
//! Usage:
//!   sheetsync blocks [FILE]                         - Markup to block JSON
//!   sheetsync inline TEXT                           - Markup to rich text JSON
//!   sheetsync filter --target column NAME EXPR      - Preview a compiled filter
//!   sheetsync render TEMPLATE ROW --bind 1=column   - Render a template for one row
//!   sheetsync config                                - Show the effective configuration

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use sheetsync_config::Config;
use sheetsync_engine::error::TransportError;
use sheetsync_engine::filter::compile;
use sheetsync_engine::store::{DatabaseQuery, DatabaseSchema, DocumentId, NewPage, QueryPage};
use sheetsync_engine::template::{BlockVarBinding, BlockVarTable};
use sheetsync_engine::{
    Annotations, DocumentStore, Row, Sheet, TemplateTree, parse_blocks, parse_inline,
};

#[derive(Parser)]
#[command(name = "sheetsync", version, about = "Inspect sheetsync markup, filters and templates")]
struct Cli {
    /// Config file (defaults to ~/.config/sheetsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse block markup from a file (or stdin) into store blocks
    Blocks { file: Option<PathBuf> },
    /// Parse inline markup into rich text
    Inline {
        text: String,
        #[arg(long)]
        bold: bool,
        #[arg(long)]
        italic: bool,
    },
    /// Compile a filter expression
    Filter {
        #[arg(long, value_enum, default_value = "column")]
        target: Target,
        /// Value type: number/text for columns, the property type otherwise
        #[arg(long = "type", default_value = "text")]
        value_type: String,
        name: String,
        expression: String,
    },
    /// Render template blocks (JSON, children inlined) against one row (JSON object)
    Render {
        template: PathBuf,
        row: PathBuf,
        /// Block variable bindings, e.g. `1=title` or `2=body:bold,italic`
        #[arg(long = "bind", value_name = "N=COLUMN[:STYLES]")]
        bindings: Vec<String>,
    },
    /// Show the effective sync options
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Column,
    Property,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Blocks { file } => {
            let text = read_input(file.as_deref())?;
            print_json(&parse_blocks(&text, Annotations::PLAIN))
        }
        Command::Inline { text, bold, italic } => {
            let defaults = Annotations::styled(bold, italic, false, false);
            print_json(&parse_inline(&text, defaults))
        }
        Command::Filter {
            target,
            value_type,
            name,
            expression,
        } => {
            let filter = compile(&expression, &name, &value_type)?;
            match target {
                Target::Column => println!("{filter}"),
                Target::Property => print_json(&filter.to_remote())?,
            }
            Ok(())
        }
        Command::Render {
            template,
            row,
            bindings,
        } => render(&template, &row, &bindings),
        Command::Config => show_config(cli.config.as_deref()),
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render(template: &Path, row: &Path, bindings: &[String]) -> Result<()> {
    let template: Vec<Value> = serde_json::from_str(&read_input(Some(template))?)
        .context("Template must be a JSON array of blocks")?;
    let row: Row =
        serde_json::from_str(&read_input(Some(row))?).context("Row must be a JSON object")?;

    let columns: Vec<String> = row.columns().map(str::to_string).collect();
    let sheet = Sheet::from_rows(columns, vec![row.clone()]);
    let bindings = bindings
        .iter()
        .map(|b| parse_binding(b))
        .collect::<Result<Vec<_>>>()?;
    let table = BlockVarTable::new(bindings, &sheet)?;

    let store = TemplateFile::new(&template);
    let tree = TemplateTree::load(&store, &template)?;
    tree.check_bindings(&table)?;
    print_json(&tree.render(&row, &table)?)
}

fn parse_binding(arg: &str) -> Result<BlockVarBinding> {
    let Some((index, rest)) = arg.split_once('=') else {
        bail!("Binding {arg:?} is not of the form N=COLUMN");
    };
    let index: u32 = index
        .trim()
        .trim_start_matches("BLOCK_")
        .parse()
        .with_context(|| format!("Bad block variable index in {arg:?}"))?;
    let (column, styles) = rest.split_once(':').unwrap_or((rest, ""));
    let has = |style: &str| styles.split(',').any(|s| s.trim() == style);
    Ok(BlockVarBinding::new(index, column.trim()).styled(Annotations::styled(
        has("bold"),
        has("italic"),
        has("underline"),
        has("strikethrough"),
    )))
}

/// Serves block children from a template file whose blocks inline them
/// under `children`.
struct TemplateFile {
    children: BTreeMap<String, Vec<Value>>,
}

impl TemplateFile {
    fn new(blocks: &[Value]) -> Self {
        fn index(blocks: &[Value], children: &mut BTreeMap<String, Vec<Value>>) {
            for block in blocks {
                if let (Some(id), Some(nested)) = (
                    block.get("id").and_then(Value::as_str),
                    block.get("children").and_then(Value::as_array),
                ) {
                    children.insert(id.to_string(), nested.clone());
                    index(nested, children);
                }
            }
        }
        let mut children = BTreeMap::new();
        index(blocks, &mut children);
        Self { children }
    }

    fn offline(operation: &str) -> TransportError {
        TransportError::new(operation, "not available offline")
    }
}

impl DocumentStore for TemplateFile {
    fn query_database(
        &self,
        _database_id: &str,
        _query: &DatabaseQuery,
        _cursor: Option<&str>,
    ) -> Result<QueryPage, TransportError> {
        Err(Self::offline("query_database"))
    }

    fn get_block_children(&self, block_id: &str) -> Result<Vec<Value>, TransportError> {
        Ok(self.children.get(block_id).cloned().unwrap_or_default())
    }

    fn create_page(&self, _page: &NewPage) -> Result<DocumentId, TransportError> {
        Err(Self::offline("create_page"))
    }

    fn archive_page(&self, _document_id: &str) -> Result<(), TransportError> {
        Err(Self::offline("archive_page"))
    }

    fn restore_page(&self, _document_id: &str) -> Result<(), TransportError> {
        Err(Self::offline("restore_page"))
    }

    fn set_page_property(
        &self,
        _document_id: &str,
        _property: &str,
        _value: Value,
    ) -> Result<(), TransportError> {
        Err(Self::offline("set_page_property"))
    }

    fn get_database_schema(&self, _database_id: &str) -> Result<DatabaseSchema, TransportError> {
        Err(Self::offline("get_database_schema"))
    }
}

fn show_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    let Some(config) = Config::load_from_path(&config_path)? else {
        bail!("No config file at {}", config_path.display());
    };
    log::info!("Loaded config from {}", config_path.display());
    if config.api_token.is_empty() {
        log::warn!("api_token is not set");
    }
    println!("{:#?}", config.sync_options());
    Ok(())
}
