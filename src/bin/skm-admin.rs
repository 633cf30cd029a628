//! Command-line admin client for the admissions API.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use skm_admissions::client::Session;
use skm_admissions::models::{
    Admission, BankDetailsUpdate, ContactMessage, News, NewsDraft, NewsUpdate,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "skm-admin")]
#[command(about = "Admin client for the admissions API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "SKM_API_URL", default_value = "http://localhost:5000/api")]
    url: String,

    #[arg(long, default_value = ".skm_admin_token")]
    token_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// List admission applications, newest first
    Admissions,
    /// Download the admissions spreadsheet (CSV)
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List contact messages, newest first
    Messages,
    #[command(subcommand)]
    News(NewsCommand),
    #[command(subcommand)]
    Bank(BankCommand),
}

#[derive(Subcommand)]
enum NewsCommand {
    List {
        /// Include hidden posts
        #[arg(short, long)]
        all: bool,
    },
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long)]
        image_url: Option<String>,
        #[arg(long)]
        hidden: bool,
    },
    Update {
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        image_url: Option<String>,
        #[arg(short, long)]
        visible: Option<bool>,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum BankCommand {
    Show,
    Set {
        #[arg(long)]
        account_name: Option<String>,
        #[arg(long)]
        account_number: Option<String>,
        #[arg(long)]
        bank_name: Option<String>,
        #[arg(long)]
        ifsc_code: Option<String>,
        #[arg(long)]
        branch_name: Option<String>,
        #[arg(long)]
        upi_id: Option<String>,
        #[arg(long)]
        qr_code_url: Option<String>,
    },
}

fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let session = Session::new(cli.url, cli.token_file);
    let client = session.client();

    match cli.command {
        Commands::Login { username, password } => {
            session.login(&username, &password).await?;
            println!("Logged in. Token saved to {}", session.token_file().display());
        }
        Commands::Logout => {
            session.logout();
            println!("Logged out (token removed).");
        }
        Commands::Admissions => {
            let res = session.send(client.get(session.endpoint("/admission"))).await?;
            let admissions: Vec<Admission> = res.json().await?;
            for a in &admissions {
                println!(
                    "{}  {}  {} {}  {}  {}",
                    a.unique_key,
                    a.submitted_at.format("%Y-%m-%d %H:%M"),
                    a.first_name,
                    a.last_name,
                    a.email,
                    a.program.as_deref().unwrap_or("-"),
                );
            }
            println!("{} application(s)", admissions.len());
        }
        Commands::Export { output } => {
            let res = session
                .send(client.get(session.endpoint("/admission/export/excel")))
                .await?;
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("admissions_{}.csv", chrono::Utc::now().format("%Y-%m-%d")))
            });
            fs::write(&output, res.bytes().await?)?;
            println!("Saved {}", output.display());
        }
        Commands::Messages => {
            let res = session.send(client.get(session.endpoint("/contact"))).await?;
            let messages: Vec<ContactMessage> = res.json().await?;
            for m in &messages {
                println!(
                    "{}  {} <{}>  {}\n    {}",
                    m.submitted_at.format("%Y-%m-%d %H:%M"),
                    m.name,
                    m.email,
                    m.subject.as_deref().unwrap_or("(no subject)"),
                    m.message,
                );
            }
            println!("{} message(s)", messages.len());
        }
        Commands::News(command) => news(&session, command).await?,
        Commands::Bank(command) => bank(&session, command).await?,
    }

    Ok(())
}

async fn news(session: &Session, command: NewsCommand) -> CliResult<()> {
    let client = session.client();
    match command {
        NewsCommand::List { all } => {
            // The public listing needs no token.
            let news: Vec<News> = if all {
                session.send(client.get(session.endpoint("/news/admin"))).await?.json().await?
            } else {
                client.get(session.endpoint("/news")).send().await?.error_for_status()?.json().await?
            };
            for n in &news {
                let flag = if n.visible { " " } else { "h" };
                println!("{flag} {}  {}  {}", n.id, n.date.format("%Y-%m-%d"), n.title);
            }
        }
        NewsCommand::Create { title, description, image_url, hidden } => {
            let draft = NewsDraft {
                title,
                description,
                image_url,
                visible: Some(!hidden),
            };
            let res = session.send(client.post(session.endpoint("/news")).json(&draft)).await?;
            print_json(&res.json::<Value>().await?)?;
        }
        NewsCommand::Update { id, title, description, image_url, visible } => {
            let update = NewsUpdate {
                title,
                description,
                image_url: image_url.map(Some),
                date: None,
                visible,
            };
            let res = session
                .send(client.put(session.endpoint(&format!("/news/{id}"))).json(&update))
                .await?;
            print_json(&res.json::<News>().await?)?;
        }
        NewsCommand::Delete { id } => {
            let res = session
                .send(client.delete(session.endpoint(&format!("/news/{id}"))))
                .await?;
            print_json(&res.json::<Value>().await?)?;
        }
    }
    Ok(())
}

async fn bank(session: &Session, command: BankCommand) -> CliResult<()> {
    let client = session.client();
    match command {
        BankCommand::Show => {
            let res = client.get(session.endpoint("/bank")).send().await?.error_for_status()?;
            print_json(&res.json::<Value>().await?)?;
        }
        BankCommand::Set {
            account_name,
            account_number,
            bank_name,
            ifsc_code,
            branch_name,
            upi_id,
            qr_code_url,
        } => {
            let update = BankDetailsUpdate {
                account_name: account_name.map(Some),
                account_number: account_number.map(Some),
                bank_name: bank_name.map(Some),
                ifsc_code: ifsc_code.map(Some),
                branch_name: branch_name.map(Some),
                upi_id: upi_id.map(Some),
                qr_code_url: qr_code_url.map(Some),
            };
            let res = session.send(client.put(session.endpoint("/bank")).json(&update)).await?;
            print_json(&res.json::<Value>().await?)?;
        }
    }
    Ok(())
}
