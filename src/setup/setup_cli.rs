use clap::{Parser, Subcommand};
use postdesk_backend::config::Config;
use postdesk_backend::helper::schema_helpers;
use postdesk_backend::models::db_operations::{forms_db_operations, users_db_operations};
use postdesk_backend::setup::db_setup;
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Form {
        #[command(subcommand)]
        action: FormAction,
    },
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    Setup {
        db_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum FormAction {
    /// Creates a form with the starter settings document.
    Seed {
        #[arg(long)]
        title: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum AccountAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "member")]
        role: String,
    },
    List,
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("platform") => setup_platform_database(&config),
                Some("records") => setup_records_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'platform' or 'records'.", other),
                None => {
                    setup_platform_database(&config);
                    setup_records_database(&config);
                }
            },
        },
        Commands::Form { action } => match action {
            FormAction::Seed { title } => seed_form(&config, title),
            FormAction::List => list_forms(&config),
        },
        Commands::Account { action } => match action {
            AccountAction::Create { username, display_name, email, role } => {
                create_account(&config, username, display_name, email, role);
            }
            AccountAction::List => list_accounts(&config),
        },
    }
}

fn setup_platform_database(config: &Config) {
    let db_path = config.platform_db_path();
    if db_path.exists() {
        println!("ℹ️ Platform database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up platform database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create platform database file.");
    match db_setup::setup_platform_db(&mut conn) {
        Ok(_) => println!("✅ Platform database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up platform database: {}", e),
    }
}

fn setup_records_database(config: &Config) {
    let db_path = config.records_db_path();
    if db_path.exists() {
        println!("ℹ️ Records database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up records database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let db = Database::create(&db_path).expect("Failed to create records database file.");
    match db_setup::setup_records_db(&db) {
        Ok(_) => println!("✅ Records database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up records database: {}", e),
    }
}

fn open_platform_db(config: &Config) -> Option<Connection> {
    let db_path = config.platform_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Platform database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    Some(Connection::open(&db_path).expect("Could not open platform database."))
}

fn seed_form(config: &Config, title: &str) {
    let conn = match open_platform_db(config) {
        Some(conn) => conn,
        None => return,
    };
    if forms_db_operations::title_exists(&conn, title) {
        eprintln!("❌ Error: A form titled '{}' already exists.", title);
        return;
    }
    let schema = schema_helpers::default_schema();
    let data = serde_json::to_string(&schema).expect("Failed to serialize the default settings.");
    match forms_db_operations::create_form(&conn, title, &data) {
        Ok(id) => println!("✅ Form '{}' created with id {}.", title, id),
        Err(e) => eprintln!("❌ Error creating form: {}", e),
    }
}

fn list_forms(config: &Config) {
    let conn = match open_platform_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match forms_db_operations::read_all_forms(&conn) {
        Ok(rows) => {
            println!("Listing submission forms:");
            for row in rows {
                println!("- [{}] {}", row.id, row.title);
            }
        }
        Err(e) => eprintln!("❌ Error fetching forms: {}", e),
    }
}

fn create_account(config: &Config, username: &str, display_name: &str, email: &str, role: &str) {
    if role != "admin" && role != "member" {
        eprintln!("❌ Error: Role must be 'admin' or 'member'.");
        return;
    }
    let conn = match open_platform_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match users_db_operations::create_account(&conn, username, display_name, email, role) {
        Ok(id) => println!("✅ Account '{}' created with id {}.", username, id),
        Err(e) => eprintln!("❌ Error creating account: {}. The username might already be taken.", e),
    }
}

fn list_accounts(config: &Config) {
    let conn = match open_platform_db(config) {
        Some(conn) => conn,
        None => return,
    };
    match users_db_operations::read_all_accounts(&conn) {
        Ok(accounts) => {
            println!("Listing accounts:");
            for account in accounts {
                println!("- [{}] {} <{}> ({})", account.id, account.display_name, account.email, account.role);
            }
        }
        Err(e) => eprintln!("❌ Error fetching accounts: {}", e),
    }
}
