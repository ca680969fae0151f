//! CLI binary for edgequake-pdf2toc.
//!
//! A thin shim over the library crate that maps CLI flags and saved
//! settings to `ExtractionConfig`, then writes or prints the bookmarks.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2toc::pipeline::input::is_url;
use edgequake_pdf2toc::{
    bookmark_to_file, default_output_path, extract, inspect, map_entries, BookmarkItem,
    ExtractionConfig, ExtractionProgressCallback, PageRange, ProgressCallback, Settings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per ToC page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>2}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Reading ToC");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, entry_count: usize) {
        let secs = self.elapsed_secs(page_num);
        let (mark, label) = if entry_count == 0 {
            (yellow("○"), yellow("no entries"))
        } else {
            (green("✓"), dim(&format!("{entry_count:>3} entries")))
        };
        self.bar.println(format!(
            "  {mark} Page {page_num:>3}  {label}  {}",
            dim(&format!("{secs:.1}s"))
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _total: usize, error: String) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} Page {page_num:>3}  {}  {}",
            red("✗"),
            red(&msg),
            dim(&format!("{secs:.1}s"))
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, entry_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let mark = if entry_count == 0 {
            red("✘")
        } else if failed > 0 {
            yellow("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{mark} {} entries from {total_pages} page(s){}",
            bold(&entry_count.to_string()),
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # ToC on pages 3-6, printed page 1 is physical page 15
  pdf2toc book.pdf --pages 3-6 --offset 14

  # Preview the entries without writing anything
  pdf2toc book.pdf --pages 3-6 --offset 14 --dry-run

  # Direct OpenAI-compatible endpoint, saved for next time
  pdf2toc book.pdf --base-url https://api.deepseek.com --api-key sk-... \
      --model deepseek-chat --save-settings

  # Show page count and current bookmarks (no API key needed)
  pdf2toc --inspect-only book.pdf

PAGE OFFSET:
  offset = physical page of printed page N  -  N
  Positive when front matter pushes chapter 1 later into the file.
  Every bookmark is clamped into [1, page count], so a bad guess never fails.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (auto-detected)
  ANTHROPIC_API_KEY       Anthropic API key (auto-detected)
  EDGEQUAKE_LLM_PROVIDER  Provider override (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Model override
  PDF2TOC_CONFIG          Settings file location (default ./pdf2toc_config.json)
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

/// Add bookmarks to a PDF by reading its table of contents with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2toc",
    version,
    about = "Add bookmarks to a PDF by reading its table of contents with a vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present_any = ["clear_settings", "save_settings"])]
    input: Option<String>,

    /// Output PDF path. Default: bookmarked_<name>.pdf next to the input.
    #[arg(short, long, env = "PDF2TOC_OUTPUT")]
    output: Option<PathBuf>,

    /// ToC page range, 1-indexed and inclusive: 3-6 or 4.
    #[arg(short, long, env = "PDF2TOC_PAGES", default_value = "1-10")]
    pages: String,

    /// Added to every printed page number to get the physical page.
    #[arg(long, env = "PDF2TOC_OFFSET", default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,

    /// Vision model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible base URL (used with --api-key).
    #[arg(long, env = "PDF2TOC_BASE_URL")]
    base_url: Option<String>,

    /// Bearer key for --base-url.
    #[arg(long, env = "PDF2TOC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Rendering DPI (72–600). Default: 300.
    #[arg(long, env = "PDF2TOC_DPI", value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Max model output tokens per page. Default: 2000.
    #[arg(long, env = "PDF2TOC_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Sampling temperature (0.0–2.0). Default: 0.1.
    #[arg(long, env = "PDF2TOC_TEMPERATURE")]
    temperature: Option<f32>,

    /// Pages in flight at once.
    #[arg(short, long, env = "PDF2TOC_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per page on transient failures.
    #[arg(long, env = "PDF2TOC_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "PDF2TOC_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2TOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2TOC_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Extract and print the bookmarks without writing a PDF.
    #[arg(long)]
    dry_run: bool,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Print page count and current bookmarks, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Save connection settings (base URL, key, model, dpi, tokens, temperature).
    #[arg(long)]
    save_settings: bool,

    /// Delete the saved settings file.
    #[arg(long)]
    clear_settings: bool,

    /// Ignore saved settings for this run.
    #[arg(long)]
    no_settings: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2TOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings_path = Settings::default_path();

    // ── Settings maintenance ─────────────────────────────────────────────
    if cli.clear_settings {
        let removed = Settings::clear(&settings_path).context("Failed to clear settings")?;
        if !cli.quiet {
            eprintln!(
                "{} {}",
                if removed { green("✔") } else { dim("·") },
                if removed {
                    format!("Removed {}", settings_path.display())
                } else {
                    "No saved settings".to_string()
                }
            );
        }
    }

    let saved = if cli.no_settings {
        None
    } else {
        Settings::load(&settings_path).context("Failed to load settings")?
    };

    if cli.save_settings {
        let settings = merge_settings(&cli, saved.clone().unwrap_or_default());
        settings
            .save(&settings_path)
            .context("Failed to save settings")?;
        if !cli.quiet {
            eprintln!("{} Settings saved to {}", green("✔"), settings_path.display());
        }
    }

    let Some(input) = cli.input.clone() else {
        return Ok(());
    };

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
            );
        } else {
            println!("File:         {input}");
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Encrypted:    {}", info.is_encrypted);
            println!("Bookmarks:    {}", info.bookmarks.len());
            print_outline(&info.bookmarks);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, saved.as_ref(), progress_cb).await?;

    // ── Dry run: extract and print ───────────────────────────────────────
    if cli.dry_run {
        let output = extract(&input, &config)
            .await
            .context("Extraction failed")?;
        let items = map_entries(&output.entries, config.page_offset, output.stats.total_pages);
        if cli.json {
            let doc = serde_json::json!({
                "bookmarks": items,
                "page_offset": config.page_offset,
                "stats": output.stats,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&doc).context("Failed to serialise output")?
            );
        } else {
            print_outline(&items);
        }
        if items.is_empty() {
            bail!("No bookmarks were extracted; check --pages and the model's access to images");
        }
        return Ok(());
    }

    // ── Extract and write ────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| output_path_for(&input));

    let report = bookmark_to_file(&input, &output_path, &config)
        .await
        .context("Bookmarking failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} bookmarks  offset {:+}  {}ms  →  {}",
            green("✔"),
            report.bookmarks.len(),
            report.page_offset,
            report.stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&report.stats.total_input_tokens.to_string()),
            dim(&report.stats.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Default output for a path or URL input.
fn output_path_for(input: &str) -> PathBuf {
    if is_url(input) {
        let name = input
            .split(['?', '#'])
            .next()
            .and_then(|s| s.rsplit('/').next())
            .filter(|s| s.contains('.'))
            .unwrap_or("downloaded.pdf");
        default_output_path(Path::new(name))
    } else {
        default_output_path(Path::new(input))
    }
}

/// Saved settings overlaid with any connection flags given on this run.
fn merge_settings(cli: &Cli, mut settings: Settings) -> Settings {
    if let Some(ref url) = cli.base_url {
        settings.base_url = url.clone();
    }
    if let Some(ref key) = cli.api_key {
        settings.api_key = key.clone();
    }
    if let Some(ref model) = cli.model {
        settings.model = model.clone();
    }
    if let Some(dpi) = cli.dpi {
        settings.dpi = dpi;
    }
    if let Some(n) = cli.max_tokens {
        settings.max_tokens = n;
    }
    if let Some(t) = cli.temperature {
        settings.temperature = t;
    }
    settings
}

/// Map settings and CLI args to `ExtractionConfig`; explicit flags win.
async fn build_config(
    cli: &Cli,
    saved: Option<&Settings>,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let system_prompt = match cli.system_prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {path:?}"))?,
        ),
        None => None,
    };

    let mut builder = ExtractionConfig::builder();
    // A named provider means the user wants edgequake-llm, not the saved endpoint.
    if let (Some(settings), None) = (saved, &cli.provider) {
        builder = settings.apply(builder);
    }

    builder = builder
        .pages(parse_pages(&cli.pages)?)
        .page_offset(cli.offset)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` ("3-6" or "4") into a `PageRange`.
fn parse_pages(s: &str) -> Result<PageRange> {
    let s = s.trim();
    let range = match s.split_once('-') {
        Some((start, end)) => PageRange::new(
            start.trim().parse().context("Invalid start page in range")?,
            end.trim().parse().context("Invalid end page in range")?,
        ),
        None => PageRange::single(s.parse().context("Invalid page number")?),
    };
    if range.start < 1 {
        bail!("Pages are 1-indexed, minimum is 1 (got {})", range.start);
    }
    if range.start > range.end {
        bail!("Invalid page range '{s}': start must be <= end");
    }
    Ok(range)
}

fn print_outline(items: &[BookmarkItem]) {
    for item in items {
        let indent = "  ".repeat(item.level.clamp(1, 8) as usize - 1);
        println!("{indent}{}  {}", item.title, dim(&format!("p.{}", item.page)));
    }
}
