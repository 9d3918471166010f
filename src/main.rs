pub mod canvas;
pub mod config;
pub mod geocode;
pub mod location;
pub mod overlay;
pub mod projection;
pub mod server;
pub mod session;
pub mod square;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a location descriptor and print the ROI square as GeoJSON
    Square {
        /// Location: "lat, lng" (axis order is disambiguated automatically)
        #[arg(short, long)]
        location: String,
        /// Distance from center to edge in meters
        #[arg(short, long)]
        distance: Option<f64>,
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive ROI/overlay engine
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Square {
            location,
            distance,
            config,
        } => {
            let app_config = config::AppConfig::load_or_default(config)?;
            let request = types::ParsedRequest {
                location: Some(serde_json::Value::String(location.clone())),
                distance_to_edge: *distance,
                ..Default::default()
            };
            let Some(resolved) = location::normalize(&request, &app_config.map) else {
                anyhow::bail!("could not resolve a coordinate pair from {location:?}");
            };

            let ring = square::square_ring(&resolved);
            let geometry = geojson::Geometry::new(geojson::Value::Polygon(vec![ring
                .iter()
                .map(|c| vec![c.x, c.y])
                .collect()]));
            let feature = geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            };
            println!("{}", serde_json::to_string_pretty(&feature)?);
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
    }

    Ok(())
}
