//! Provision an admin identity directly in the store.
//!
//! Admins are never created through the API. Run once per deployment:
//!   cargo run --bin create_admin -- --username admin --password admin123

use std::path::PathBuf;

use clap::Parser;
use uuid::Uuid;

use skm_admissions::auth::hash_password;
use skm_admissions::config::DEFAULT_DATA_DIR;
use skm_admissions::models::AdminIdentity;
use skm_admissions::storage::{Storage, StorageError};

#[derive(Parser)]
#[command(name = "create_admin")]
#[command(about = "Create an admin identity", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "admin")]
    username: String,

    #[arg(short, long, default_value = "admin123")]
    password: String,

    /// Create the identity without the admin flag
    #[arg(long)]
    no_admin: bool,

    #[arg(short, long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    cost: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let storage = Storage::open(&args.data_dir)?;
    let identity = AdminIdentity {
        id: Uuid::new_v4(),
        username: args.username.clone(),
        password_hash: hash_password(&args.password, args.cost)?,
        is_admin: !args.no_admin,
    };

    match storage.create_admin(&identity) {
        Ok(()) => {
            storage.flush().await?;
            println!("Admin {:?} created (isAdmin = {})", identity.username, identity.is_admin);
            Ok(())
        }
        Err(StorageError::DuplicateUsername(name)) => {
            eprintln!("Admin {name:?} already exists; nothing changed");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
