//! Command-line front end for crop recommendations.
//!
//! Usage:
//!     cropwise recommend --state Maharashtra --season Kharif --area 5
//!     cropwise --artifacts model.json recommend --state Bihar --season Rabi --format json
//!     cropwise vocab

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cropwise_catalog::AgronomyCatalog;
use cropwise_classifier::ModelArtifacts;
use cropwise_engine::{recommend, EngineContext};
use cropwise_model::Recommendation;
use cropwise_weather::{
    WeatherConfig, WeatherError, WeatherProvider, WttrClient, WEATHER_UNAVAILABLE,
};
use serde::Serialize;

const MIN_AREA: f64 = 1.0;
const MAX_AREA: f64 = 10000.0;

#[derive(Parser)]
#[command(name = "cropwise")]
#[command(about = "Recommend crops by state, season and area")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model artifact bundle (encoders + classifier)
    #[arg(long, default_value = "model.json")]
    artifacts: PathBuf,

    /// Custom agronomy catalog (JSON array); built-in catalog if omitted
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// wttr.in base URL
    #[arg(long, default_value = "https://wttr.in")]
    weather_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend crops
    Recommend {
        /// State name
        #[arg(long)]
        state: String,

        /// Season name
        #[arg(long)]
        season: String,

        /// Cultivated area in acres (1 - 10000)
        #[arg(short, long, default_value = "5.0", value_parser = parse_area)]
        area: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Skip the weather lookup
        #[arg(long)]
        no_weather: bool,
    },

    /// List known states and seasons
    Vocab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    recommendation: &'a Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    weather: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cropwise=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ctx = load_context(&cli)?;

    match cli.command {
        Commands::Recommend {
            state,
            season,
            area,
            format,
            no_weather,
        } => {
            let weather = WeatherConfig {
                base_url: cli.weather_url,
                ..Default::default()
            };
            run_recommend(&ctx, &state, &season, area, format, (!no_weather).then_some(weather))
                .await?;
        }
        Commands::Vocab => {
            print!("{}", render_vocab(&ctx));
        }
    }

    Ok(())
}

/// Load artifacts and catalog once; failures here are fatal.
fn load_context(cli: &Cli) -> Result<EngineContext> {
    let artifacts = ModelArtifacts::from_path(&cli.artifacts).with_context(|| {
        format!(
            "Could not load model/encoders from {}",
            cli.artifacts.display()
        )
    })?;

    let catalog = match &cli.catalog {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read catalog {}", path.display()))?;
            AgronomyCatalog::from_json_str(&raw)
                .with_context(|| format!("Invalid catalog {}", path.display()))?
        }
        None => AgronomyCatalog::default(),
    };

    Ok(EngineContext::new(artifacts, catalog))
}

async fn run_recommend(
    ctx: &EngineContext,
    state: &str,
    season: &str,
    area: f64,
    format: OutputFormat,
    weather: Option<WeatherConfig>,
) -> Result<()> {
    let rec = recommend(ctx, state, season, area)?;

    let weather_text = match weather {
        Some(config) => Some(current_weather(WttrClient::new(config), &rec.state).await),
        None => None,
    };

    if format == OutputFormat::Json {
        let output = JsonOutput {
            recommendation: &rec,
            weather: weather_text.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", render_text(&rec, weather_text.as_deref()));
    }

    Ok(())
}

/// Weather summary for `location`; a client that failed to build degrades to the sentinel.
async fn current_weather<P: WeatherProvider>(
    client: Result<P, WeatherError>,
    location: &str,
) -> String {
    match client {
        Ok(client) => {
            tracing::debug!(provider = client.name(), "Looking up weather");
            client.current(location).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Weather client unavailable");
            WEATHER_UNAVAILABLE.to_string()
        }
    }
}

fn parse_area(raw: &str) -> Result<f64, String> {
    let area: f64 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !(MIN_AREA..=MAX_AREA).contains(&area) {
        return Err(format!(
            "area must be between {} and {} acres",
            MIN_AREA, MAX_AREA
        ));
    }
    Ok(area)
}

fn render_text(rec: &Recommendation, weather: Option<&str>) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Top Recommendations for {} ({}) - Area: {} acres",
        rec.state, rec.season, rec.area
    );

    for crop in &rec.crops {
        let detail = &crop.detail;
        let _ = writeln!(out, "\n{}. {} ({:.1}% confidence)", crop.rank, crop.crop, crop.confidence);
        if detail.source.is_fallback() {
            let _ = writeln!(out, "   {} for {}:", detail.source.label(), crop.crop);
        }
        let _ = writeln!(out, "   Fertilizer: {}", detail.fertilizer);
        let _ = writeln!(out, "   Pesticide: {}", detail.pesticide);
        let approx = if detail.source.is_fallback() { "approx " } else { "" };
        let _ = writeln!(
            out,
            "   Estimated Yield: {:.1} quintals ({}for {} acres)",
            detail.estimated_yield, approx, rec.area
        );
    }

    if let Some(weather) = weather {
        let _ = writeln!(out, "\n---\nCurrent Weather (approx): {}", weather);
    }

    out
}

fn render_vocab(ctx: &EngineContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "States:");
    for state in ctx.states().sorted_classes() {
        let _ = writeln!(out, "  {}", state);
    }
    let _ = writeln!(out, "Seasons:");
    for season in ctx.seasons().sorted_classes() {
        let _ = writeln!(out, "  {}", season);
    }
    out
}
