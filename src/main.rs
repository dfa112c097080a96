use anyhow::Context;
use clap::Parser;
use scribe_db::index::IndexedField;
use scribe_db::models::{typed_from_document, typed_to_document};
use scribe_db::{
    BaseModel, DataManager, Document, Entity, ManagerConfig, Record, Repository,
    RepositorySettings, SearchRequest,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

const COLLECTION_NAME: &str = "TestItems";
const AUDIT_USER: &str = "test_user";
const RULE: &str = "-------------------------------";

#[derive(Parser)]
#[command(name = "scribe-db")]
#[command(about = "Interactive example shell for the scribe data layer")]
struct Args {
    /// `memory://<name>` or `sled://<directory>`
    #[arg(long, default_value = "sled://scribe_data")]
    connection: String,

    #[arg(long, default_value = "scribetest")]
    database: String,

    /// Trace every store command
    #[arg(long)]
    log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TestItem {
    #[serde(flatten)]
    base: BaseModel,
    #[serde(default)]
    name: String,
}

impl Record for TestItem {
    fn to_document(&self) -> scribe_db::Result<Document> {
        typed_to_document(self)
    }

    fn from_document(doc: Document) -> scribe_db::Result<Self> {
        typed_from_document(doc)
    }
}

impl Entity for TestItem {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn index_fields() -> Vec<IndexedField> {
        vec![IndexedField::new("name", "name")]
    }
}

fn banner() {
    println!("Scribe");
    println!("Document Data Example");
}

fn show_help() {
    println!("Help");
    println!("help - shows the application help");
    println!("conn <connection string> <database> - opens a new connection with the connection string and database sent");
    println!("add <name> - creates a new test item with the name sent");
    println!("list - lists all the test items in the database");
    println!("clear - clears the console screen");
    println!("quit - closes application");
}

fn connect(settings: RepositorySettings) -> anyhow::Result<DataManager<TestItem>> {
    println!("Connection String: {}", settings.connection_string);
    println!("Database: {}", settings.database_name);
    let repository = Repository::open(settings).context("failed to open repository")?;
    let config = ManagerConfig::new(COLLECTION_NAME).with_audit_user(AUDIT_USER);
    Ok(DataManager::new(repository, config))
}

async fn add_item(manager: &DataManager<TestItem>, name: String) -> anyhow::Result<()> {
    let mut base = BaseModel::default();
    base.quick_search_value = name.clone();
    let item = TestItem { base, name };
    let saved = manager.create(item).await?;
    println!(
        "UpsertedId: {}",
        saved.base.id_string().unwrap_or_default()
    );
    Ok(())
}

async fn list_items(manager: &DataManager<TestItem>) -> anyhow::Result<()> {
    let result = manager.search(SearchRequest::new()).await?;
    println!("TotalCount: {}", result.total_count);
    for item in result.results {
        let base = &item.base;
        println!("{}", RULE);
        println!("Id: {}", base.id_string().unwrap_or_default());
        println!("Name: {}", item.name);
        println!("Deleted: {}", base.deleted);
        println!("Archived: {}", base.archived);
        println!("CreatedBy: {}", base.created_by.as_deref().unwrap_or_default());
        println!("CreatedDate: {}", display_date(base.created_date));
        println!("UpdatedBy: {}", base.updated_by.as_deref().unwrap_or_default());
        println!("UpdatedDate: {}", display_date(base.updated_date));
        println!("Version: {}", base.version);
    }
    Ok(())
}

fn display_date(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    banner();

    let mut manager = connect(
        RepositorySettings::new(args.connection, args.database).with_log(args.log),
    )?;
    if let Err(e) = manager.ensure_indexes().await {
        eprintln!("Index creation failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            continue;
        };

        let outcome = match command {
            "help" => {
                show_help();
                Ok(())
            }
            "conn" => match (parts.get(1), parts.get(2)) {
                (Some(conn), Some(db)) => {
                    connect(RepositorySettings::new(*conn, *db).with_log(args.log)).map(|m| {
                        manager = m;
                    })
                }
                _ => {
                    println!("usage: conn <connection string> <database>");
                    Ok(())
                }
            },
            "add" => {
                let name = if parts.len() > 1 {
                    parts[1..].join(" ")
                } else {
                    format!("New Item: {}", chrono::Local::now().format("%Y-%m-%d"))
                };
                add_item(&manager, name).await
            }
            "list" => list_items(&manager).await,
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                banner();
                Ok(())
            }
            "quit" => break,
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            println!("Exception: {:#}", e);
        }
        println!("{}", RULE);
    }

    Ok(())
}
