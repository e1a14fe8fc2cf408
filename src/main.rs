use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use email_screenshots::config::Config;
use email_screenshots::email::{EmailProcessor, ProcessorSettings};
use email_screenshots::jmap_client::JmapClient;
use email_screenshots::screenshot::ScreenshotGenerator;

#[derive(Parser)]
#[command(name = "email-screenshots")]
#[command(about = "Screenshot the HTML body of emails in a JMAP folder, then archive them")]
#[command(version = "0.1.0")]
struct Args {
    /// Preview operations without making changes
    #[arg(short, long)]
    dry_run: bool,

    /// Maximum emails to process (default: 0 = all)
    #[arg(short = 'l', long, default_value_t = 0)]
    limit: usize,

    /// Screenshot directory (overrides SCREENSHOT_DIR)
    #[arg(short = 'o', long)]
    output_dir: Option<String>,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::init();

    let mut config = Config::new()?;

    if let Some(output_dir) = args.output_dir {
        config.screenshot.output_dir = output_dir;
    }

    if args.check_config {
        print_config(&config);
        return Ok(());
    }

    if args.dry_run {
        info!("🧪 Starting in DRY-RUN mode");
    }

    println!("Starting email screenshot generator...");

    let client = JmapClient::new(&config.jmap)
        .await
        .context("Failed to create JMAP client")?;
    println!("✓ Connected to JMAP server");

    let generator = ScreenshotGenerator::new(&config.screenshot)
        .context("Failed to create screenshot generator")?;

    let processor = EmailProcessor::new(client, generator, ProcessorSettings::from(&config));

    let mut stdout = std::io::stdout();
    let result = match processor.process_emails(args.limit, args.dry_run, &mut stdout).await {
        Ok(result) => result,
        Err(e) => {
            error!("❌ Failed to process emails: {:#}", e);
            return Err(e.context("Failed to process emails"));
        }
    };

    println!("\n=== Summary ===");
    println!("Total emails: {}", result.emails_found);
    println!("Successfully processed: {}", result.emails_processed);
    println!("Failed: {}", result.emails_failed);

    Ok(())
}

fn print_config(config: &Config) {
    let masked_key = match config.jmap.api_key.get(..4) {
        Some(prefix) => format!("{}…", prefix),
        None => "****".to_string(),
    };

    println!("✅ Configuration valid!");
    println!("📧 JMAP session: {}", config.jmap.session_url);
    println!("🔑 API key: {}", masked_key);
    println!("📥 Source folder: {}", config.folders.source);
    println!("📦 Archive folder: {}", config.folders.archive);
    println!("📁 Screenshot directory: {}", config.screenshot.output_dir);
    println!("🖼️  Viewport: {}x{}", config.screenshot.width, config.screenshot.height);
    println!("🏷️  File naming: {}", config.screenshot.naming);
    println!("⏱️  Render timeout: {}s", config.screenshot.timeout_secs);
}
