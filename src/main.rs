use std::sync::Arc;

use thelden::App;
use thelden::config::{self, Config};
use thelden::error::Result;
use thelden::library::{Catalog, TitleDetails};
use thelden::session::FileSessionStore;
use thelden::transfer::{NoopMediaStore, UploadStatus};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Used when no admin address is configured
const GUEST_EMAIL: &str = "guest@thelden.app";

fn setup_logging() -> Result<()> {
    let data_dir = config::data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    let file_appender = tracing_appender::rolling::daily(&data_dir, "thelden.log");

    let filter = match "thelden=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .init();

    Ok(())
}

/// A handful of titles so the home screen is not empty
fn seed_catalog() -> Catalog {
    let mut catalog = Catalog::with_default_categories();
    let categories: Vec<String> = catalog
        .categories()
        .iter()
        .map(|c| c.title.clone())
        .collect();

    for category in categories {
        for n in 1..=3 {
            let mut details = TitleDetails::new(
                format!("{category} #{n}"),
                format!("https://media.thelden.app/{n}.mp4"),
                format!("https://picsum.photos/seed/{}-{n}/300/450", category.len()),
            );
            details.synopsis = format!("Feature {n} from {category}");
            details.category = Some(category.clone());
            if let Err(e) = catalog.add_title(details) {
                warn!("Skipping seed title: {}", e);
            }
        }
    }
    catalog
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to a file so stdout stays free for the summary
    if let Err(e) = setup_logging() {
        eprintln!("Warning: Could not set up logging: {}", e);
    }

    info!("Starting thelden");

    let config = Config::load()?;
    info!("Loaded config");

    let store = FileSessionStore::new(config::session_dir()?);
    let mut app = App::new(config, Box::new(store), Arc::new(NoopMediaStore), seed_catalog())?;

    // Default to an admin so the ingestion demo has something to show
    let email = std::env::args()
        .nth(1)
        .or_else(|| app.config.auth.admin_emails.first().cloned())
        .unwrap_or_else(|| GUEST_EMAIL.to_string());
    let user = match app.user() {
        Some(user) => user.clone(),
        None => app.sign_in(&email)?.clone(),
    };
    info!(email = %user.email, role = ?user.role, "Session ready");

    let Some(first) = app.catalog().titles().first().map(|t| t.id.clone()) else {
        return Ok(());
    };
    app.start_download(&first)?;

    if app.can_start_upload() {
        let mut draft = TitleDetails::new(
            "Midnight Premiere",
            "https://media.thelden.app/premiere.mp4",
            "https://picsum.photos/seed/premiere/300/450",
        );
        draft.synopsis = "Freshly ingested".to_string();
        app.start_upload(draft, "Premieres")?;
    } else {
        info!(email = %user.email, "Skipping upload demo: not an admin");
        println!("Skipping upload: {} is not an admin", user.email);
    }

    let mut downloads = app.subscribe_downloads();
    while app.is_downloading(&first) {
        if downloads.changed().await.is_err() {
            break;
        }
    }
    println!("Downloaded {}", first);

    if app.upload().status != UploadStatus::Idle {
        let mut upload = app.subscribe_upload();
        while app.upload().status != UploadStatus::Complete {
            if upload.changed().await.is_err() {
                break;
            }
        }
        let published = app.acknowledge_upload()?;
        println!(
            "Published {} into {}",
            published.title.display_name(),
            published.title.category().unwrap_or_default()
        );
    }

    for group in app.grouped_by_category() {
        println!("{} ({})", group.category.title, group.titles.len());
        for title in &group.titles {
            println!("  {}", title.display_name());
        }
    }

    Ok(())
}
