//! CLI binary for image2html.
//!
//! A thin shim over the library crate: maps flags to `ConversionOptions` and
//! `ConverterConfig`, drives a `Session` with a live elapsed-time spinner and
//! prints or saves the resulting fragment.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use image2html::{
    default_model_for_provider, list_models, refine, resolve_image, save_document, AttemptStatus,
    ConversionOptions, ConverterConfig, HtmlFragment, ImageAsset, Session, SessionSnapshot,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn new_spinner(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS),
    );
    bar.set_prefix(prefix.to_string());
    bar.set_message("0s  (Ctrl-C to cancel)");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a screenshot, print the fragment to stdout
  image2html login.png

  # Save a standalone HTML document
  image2html login.png -o login.html

  # Pixel-precise output in grayscale
  image2html --fidelity 95 --no-colors dashboard.png

  # Convert, then revise the result
  image2html card.png --refine "make the button rounded and blue"

  # Revise an earlier fragment without regenerating it first
  image2html card.png --previous card.html --refine "add a footer"

  # From a URL, or from stdin
  image2html https://example.com/mock.png
  cat mock.png | image2html -

  # Models available to your key
  image2html --list-models

FIDELITY:
  0-20    Simple    clean, simplified structure
  21-80   Balanced  structure and style in equal measure
  81-100  Precise   match spacing, sizes and alignment closely

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Google Gemini API key (API_KEY is also accepted)
  IMAGE2HTML_PROVIDER   Provider: gemini (default), openai, anthropic, ollama, …
  IMAGE2HTML_MODEL      Model ID (default: gemini-2.5-flash)
  IMAGE2HTML_FIDELITY   Fidelity level 0-100 (default: 50)
  RUST_LOG              Override log filter (e.g. image2html=debug)
"#;

/// Convert UI screenshots and mock-ups to inline-styled HTML fragments.
#[derive(Parser, Debug)]
#[command(
    name = "image2html",
    version,
    about = "Convert UI screenshots and mock-ups to inline-styled HTML fragments",
    long_about = "Convert an image of a user interface (local file, URL or stdin) into an HTML \
fragment styled only with inline style attributes, using a multimodal LLM. Google Gemini is the \
default; OpenAI, Anthropic, Ollama and other edgequake-llm providers are also supported.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file path, HTTP/HTTPS URL, or `-` for stdin.
    #[arg(required_unless_present = "list_models")]
    input: Option<String>,

    /// Write a standalone HTML document to this file instead of stdout.
    #[arg(short, long, env = "IMAGE2HTML_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write a preview document (white page, padded) to this file.
    #[arg(long, env = "IMAGE2HTML_PREVIEW")]
    preview: Option<PathBuf>,

    /// Model ID (e.g. gemini-2.5-flash, gemini-2.5-pro).
    #[arg(long, env = "IMAGE2HTML_MODEL")]
    model: Option<String>,

    /// Provider: gemini, openai, anthropic, ollama, …
    #[arg(long, env = "IMAGE2HTML_PROVIDER")]
    provider: Option<String>,

    /// Override the Gemini API base URL.
    #[arg(long, env = "IMAGE2HTML_BASE_URL")]
    base_url: Option<String>,

    /// Fidelity level 0-100: simple (≤20), balanced (21-80), precise (>80).
    #[arg(long, env = "IMAGE2HTML_FIDELITY", default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    fidelity: u8,

    /// Render in grayscale instead of reproducing the image's colours.
    #[arg(long, env = "IMAGE2HTML_NO_COLORS")]
    no_colors: bool,

    /// Revise the generated fragment with this instruction.
    #[arg(long, value_name = "INSTRUCTION")]
    refine: Option<String>,

    /// Refine this existing fragment file instead of converting first.
    #[arg(long, requires = "refine")]
    previous: Option<PathBuf>,

    /// Print the models available for conversion and exit.
    ///
    /// Only Gemini publishes a listing. Other providers print their default
    /// model followed by the Gemini fallback ids.
    #[arg(long)]
    list_models: bool,

    /// Path to a text file replacing the base instruction prompt.
    #[arg(long, env = "IMAGE2HTML_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max output tokens for the generation call.
    #[arg(long, env = "IMAGE2HTML_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "IMAGE2HTML_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Output JSON (model, timing, fragment) instead of raw HTML.
    #[arg(long, env = "IMAGE2HTML_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "IMAGE2HTML_NO_PROGRESS")]
    no_progress: bool,

    /// Never prompt for a retry after a failure.
    #[arg(long)]
    no_retry: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMAGE2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMAGE2HTML_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "IMAGE2HTML_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Generation call timeout in seconds.
    #[arg(long, env = "IMAGE2HTML_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    model: &'a str,
    fidelity: u8,
    reproduce_colors: bool,
    refined: bool,
    duration_ms: u128,
    html: &'a HtmlFragment,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner is the feedback in progress mode; library INFO logs would
    // only tear it apart.
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

    let config = build_config(&cli).await?;

    // ── List-models mode ─────────────────────────────────────────────────
    if cli.list_models {
        let models = list_models(&config).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&models).context("Failed to serialise models")?
            );
        } else {
            for m in &models {
                println!("{m}");
            }
        }
        return Ok(());
    }

    let input = cli.input.as_deref().context("No input image given")?;
    let image = resolve_image(input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to read image '{input}'"))?;

    let mut options = ConversionOptions::default()
        .fidelity(cli.fidelity)
        .reproduce_colors(!cli.no_colors);
    if let Some(ref model) = cli.model {
        options = options.model(model.clone());
    }

    // ── Convert (or load the fragment to refine) ─────────────────────────
    let started = Instant::now();
    let mut fragment = match cli.previous {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read previous fragment from {:?}", path))?;
            HtmlFragment::from_model_output(&text)
        }
        None => run_session(&cli, &config, &options, image.clone(), show_progress).await?,
    };

    // ── Refine ───────────────────────────────────────────────────────────
    if let Some(ref instruction) = cli.refine {
        fragment = run_refine(&image, &fragment, instruction, &options, &config, show_progress)
            .await?;
    }
    let duration_ms = started.elapsed().as_millis();

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref path) = cli.preview {
        tokio::fs::write(path, fragment.to_preview_document())
            .await
            .with_context(|| format!("Failed to write preview to {:?}", path))?;
    }

    if cli.json {
        let out = JsonOutput {
            model: effective_model(&options, &config),
            fidelity: options.fidelity,
            reproduce_colors: options.reproduce_colors,
            refined: cli.refine.is_some(),
            duration_ms,
            html: &fragment,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialise output")?
        );
    }

    if let Some(ref path) = cli.output {
        save_document(&fragment, path)
            .await
            .context("Failed to save document")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}ms  →  {}",
                green("✔"),
                duration_ms,
                bold(&path.display().to_string())
            );
        }
    } else if !cli.json {
        let text = fragment.to_clipboard_text();
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
        if !cli.quiet {
            eprintln!("{}", dim(&format!("{} chars in {}ms", text.len(), duration_ms)));
        }
    }

    Ok(())
}

/// Model the request is sent to: the explicit choice, else the provider's
/// default.
fn effective_model<'a>(options: &'a ConversionOptions, config: &ConverterConfig) -> &'a str {
    options
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_model_for_provider(config.provider()))
}

/// Map CLI args to `ConverterConfig`.
async fn build_config(cli: &Cli) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .temperature(cli.temperature)
        .max_output_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Run conversion attempts until one succeeds, the user cancels, or the
/// user declines a retry.
async fn run_session(
    cli: &Cli,
    config: &ConverterConfig,
    options: &ConversionOptions,
    image: ImageAsset,
    show_progress: bool,
) -> Result<HtmlFragment> {
    let session = Session::new(config.clone(), options.clone());
    session.select_image(image);

    loop {
        let spinner = show_progress.then(|| new_spinner("Converting"));
        let snap = watch_attempt(&session, spinner.as_ref()).await;
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }

        match snap.status {
            AttemptStatus::Succeeded => {
                if !cli.quiet && show_progress {
                    eprintln!("{} HTML generated in {}s", green("✔"), snap.elapsed_secs);
                }
                return snap.html.context("Session succeeded without a fragment");
            }
            AttemptStatus::Cancelled => {
                let message = snap.message.unwrap_or_default();
                bail!("{message}");
            }
            AttemptStatus::Failed => {
                let message = snap.message.unwrap_or_default();
                eprintln!("{} {}", red("✘"), message);
                if !cli.no_retry && ask_retry().await? && session.retry() {
                    continue;
                }
                bail!("Conversion failed");
            }
            AttemptStatus::Idle | AttemptStatus::Running => {
                bail!("Conversion ended unexpectedly ({:?})", snap.status);
            }
        }
    }
}

/// Follow one attempt to its end, updating the spinner and mapping Ctrl-C
/// to a cancel.
async fn watch_attempt(session: &Session, spinner: Option<&ProgressBar>) -> SessionSnapshot {
    let updates = session.updates();
    tokio::pin!(updates);
    let mut last = session.snapshot();

    loop {
        tokio::select! {
            next = updates.next() => match next {
                Some(snap) => {
                    if let Some(bar) = spinner {
                        bar.set_message(format!("{}s  (Ctrl-C to cancel)", snap.elapsed_secs));
                    }
                    last = snap;
                    if last.status != AttemptStatus::Running {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
            }
        }
    }
    last
}

/// Run one refine call with a spinner; Ctrl-C abandons it.
async fn run_refine(
    image: &ImageAsset,
    previous: &HtmlFragment,
    instruction: &str,
    options: &ConversionOptions,
    config: &ConverterConfig,
    show_progress: bool,
) -> Result<HtmlFragment> {
    let spinner = show_progress.then(|| new_spinner("Refining"));
    let started = Instant::now();

    let call = refine(image, previous, instruction, options, config);
    tokio::pin!(call);
    let result = loop {
        tokio::select! {
            result = &mut call => break result,
            _ = tokio::time::sleep(Duration::from_secs(1)), if spinner.is_some() => {
                if let Some(ref bar) = spinner {
                    bar.set_message(format!(
                        "{}s  (Ctrl-C to cancel)",
                        started.elapsed().as_secs()
                    ));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(ref bar) = spinner {
                    bar.finish_and_clear();
                }
                bail!("{}", image2html::Image2HtmlError::Cancelled);
            }
        }
    };

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    result.context("Refinement failed")
}

/// Ask on the terminal whether to retry. `false` when stdin is not a TTY.
async fn ask_retry() -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }
    eprint!("Retry? [y/N] ");
    io::stderr().flush().ok();

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read answer")?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
