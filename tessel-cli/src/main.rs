//! Tessel CLI Tool
//!
//! Command-line interface for inspecting images and exercising the region
//! and tile renderers.

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tessel_decoder::tessel_core::{
    render, Image, PixelBuffer, RenderRequest, Rgba, TileRenderer, TileRequest, MAX_TILE_SIZE,
};
use tessel_decoder::{DecodeConfig, Decoder};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessel")]
#[command(about = "Tessel - image decoding and tiled rendering")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    decode: DecodeArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Decoder limits; flags override values from the config file
#[derive(Args)]
struct DecodeArgs {
    /// JSON file with decoder settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Largest accepted image width
    #[arg(long, global = true)]
    max_width: Option<u32>,

    /// Largest accepted image height
    #[arg(long, global = true)]
    max_height: Option<u32>,

    /// Pixel storage limit per image, in MiB
    #[arg(long, global = true)]
    max_alloc_mb: Option<u64>,

    /// Largest accepted input, in MiB
    #[arg(long, global = true)]
    max_input_mb: Option<u64>,

    /// Decode only the first frame of animations
    #[arg(long, global = true)]
    no_animation: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what an image file contains
    Info {
        /// Input image file path
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a region of an image into a PNG
    Render {
        /// Input image file path
        input: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// Region left edge in the source (may be negative)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        src_x: i32,

        /// Region top edge in the source (may be negative)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        src_y: i32,

        /// Region width (defaults to the image width)
        #[arg(long)]
        width: Option<i32>,

        /// Region height (defaults to the image height)
        #[arg(long)]
        height: Option<i32>,

        /// Where the region lands in the output
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        dst_x: i32,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        dst_y: i32,

        /// Output width (defaults to the region width)
        #[arg(long)]
        out_width: Option<u32>,

        /// Output height (defaults to the region height)
        #[arg(long)]
        out_height: Option<u32>,

        /// Paint parts of the region outside the image with this colour
        /// (AARRGGBB hex, e.g. ff202020)
        #[arg(long, value_parser = parse_argb)]
        fill: Option<Rgba>,

        /// Animation frame to render
        #[arg(long, default_value = "0")]
        frame: usize,
    },

    /// Cut an image into tiles and write each one as a PNG
    Tiles {
        /// Input image file path
        input: PathBuf,

        /// Output directory for tiles
        #[arg(short, long)]
        output: PathBuf,

        /// Tile side in pixels
        #[arg(long, default_value = "256")]
        tile_size: u32,
    },

    /// Export every animation frame as a PNG
    Frames {
        /// Input image file path
        input: PathBuf,

        /// Output directory for frames
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let decoder = Decoder::with_config(load_config(&cli.decode)?);

    match cli.command {
        Commands::Info { input, json } => show_info(&decoder, &input, json)?,

        Commands::Render {
            input,
            output,
            src_x,
            src_y,
            width,
            height,
            dst_x,
            dst_y,
            out_width,
            out_height,
            fill,
            frame,
        } => {
            let mut image = open_image(&decoder, &input)?;
            for _ in 0..frame % image.frame_count() {
                image.advance();
            }

            let width = width.unwrap_or(image.width() as i32);
            let height = height.unwrap_or(image.height() as i32);
            ensure!(width > 0 && height > 0, "Region must not be empty");

            let mut request = RenderRequest::new(src_x, src_y, width, height).at(dst_x, dst_y);
            if let Some(color) = fill {
                request = request.fill_blank(color);
            }

            let mut canvas = PixelBuffer::new(
                out_width.unwrap_or(width as u32),
                out_height.unwrap_or(height as u32),
            )
            .context("Invalid output size")?;
            render(&image, &mut canvas, &request);

            save_png(&canvas, &output)?;
            println!("Saved region to {}", output.display());
        }

        Commands::Tiles {
            input,
            output,
            tile_size,
        } => write_tiles(&decoder, &input, &output, tile_size)?,

        Commands::Frames { input, output } => write_frames(&decoder, &input, &output)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &DecodeArgs) -> Result<DecodeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => DecodeConfig::default(),
    };

    if let Some(width) = args.max_width {
        config.max_width = width;
    }
    if let Some(height) = args.max_height {
        config.max_height = height;
    }
    if let Some(mb) = args.max_alloc_mb {
        config.max_alloc_bytes = mb * 1024 * 1024;
    }
    if let Some(mb) = args.max_input_mb {
        config.max_input_bytes = mb * 1024 * 1024;
    }
    if args.no_animation {
        config.decode_animation = false;
    }

    tracing::debug!(?config, "decoder configuration");
    Ok(config)
}

fn open_image(decoder: &Decoder, input: &Path) -> Result<Image> {
    decoder
        .decode_file(input)
        .with_context(|| format!("Failed to decode {}", input.display()))
}

fn show_info(decoder: &Decoder, input: &Path, json: bool) -> Result<()> {
    let image = open_image(decoder, input)?;
    let info = image.info();

    if json {
        println!("{}", info.to_json().context("Failed to serialize image info")?);
        return Ok(());
    }

    println!("\n=== Image Information ===");
    println!("File: {}", input.display());
    println!("Format: {}", info.format);
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Kind: {:?}", info.kind);
    println!("Opaque: {}", if info.opaque { "yes" } else { "no" });
    println!("Frames: {}", info.frame_count);

    if image.is_animated() {
        println!(
            "Duration: {} ms ({:.2} seconds)",
            info.total_duration_ms,
            info.total_duration_ms as f64 / 1000.0
        );
        println!("\n=== Frames (first 10) ===");
        for (i, frame) in image.frames().iter().take(10).enumerate() {
            println!("  [{}] {} ms", i, frame.delay_ms);
        }
        if image.frame_count() > 10 {
            println!("  ... and {} more frames", image.frame_count() - 10);
        }
    }

    Ok(())
}

fn write_tiles(decoder: &Decoder, input: &Path, output_dir: &Path, tile_size: u32) -> Result<()> {
    ensure!(
        (1..=MAX_TILE_SIZE).contains(&tile_size),
        "Tile size must be between 1 and {MAX_TILE_SIZE}"
    );

    let image = open_image(decoder, input)?;
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;

    let mut renderer = TileRenderer::new().context("Failed to allocate tile buffer")?;
    let grid = tile_grid(image.width(), image.height(), tile_size);
    println!("Writing {} tiles to {}", grid.len(), output_dir.display());

    for (index, request) in grid.iter().enumerate() {
        let Some(tile) = renderer.render_tile(&image, request) else {
            bail!("Tile {index} was rejected by the renderer");
        };
        let path = output_dir.join(format!(
            "tile_{:05}_{:05}.png",
            request.src_y, request.src_x
        ));
        image::save_buffer(
            &path,
            tile.bytes(),
            tile.width,
            tile.height,
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("Failed to save tile {}", path.display()))?;
    }

    println!("Successfully wrote all tiles");
    Ok(())
}

/// Row-major tiles covering the image; edge tiles are cut to fit
fn tile_grid(width: u32, height: u32, tile_size: u32) -> Vec<TileRequest> {
    let mut grid = Vec::new();
    for y in (0..height).step_by(tile_size as usize) {
        for x in (0..width).step_by(tile_size as usize) {
            let w = tile_size.min(width - x);
            let h = tile_size.min(height - y);
            let request = TileRequest::new(x as i32, y as i32, w as i32, h as i32);
            grid.push(request.init(grid.is_empty()));
        }
    }
    grid
}

fn write_frames(decoder: &Decoder, input: &Path, output_dir: &Path) -> Result<()> {
    let mut image = open_image(decoder, input)?;
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;

    let frame_count = image.frame_count();
    println!("Extracting {} frames to {}", frame_count, output_dir.display());

    let mut canvas = PixelBuffer::new(image.width(), image.height())?;
    let full = RenderRequest::new(0, 0, image.width() as i32, image.height() as i32);

    for i in 0..frame_count {
        render(&image, &mut canvas, &full);
        let path = output_dir.join(format!("frame_{:06}.png", i));
        save_png(&canvas, &path)?;
        println!("  [{}] {} ms -> {}", i, image.delay_ms(), path.display());
        image.advance();
    }

    println!("Successfully extracted all frames");
    Ok(())
}

fn save_png(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    image::save_buffer(
        path,
        &buffer.to_packed(),
        buffer.width(),
        buffer.height(),
        image::ExtendedColorType::Rgba8,
    )
    .with_context(|| format!("Failed to save {}", path.display()))
}

/// Parses `AARRGGBB` (optionally prefixed with `#` or `0x`)
fn parse_argb(value: &str) -> Result<Rgba> {
    let hex = value
        .trim_start_matches('#')
        .trim_start_matches("0x");
    ensure!(hex.len() == 8, "Expected 8 hex digits (AARRGGBB), got {value:?}");
    let argb = u32::from_str_radix(hex, 16).with_context(|| format!("Invalid colour {value:?}"))?;
    Ok(Rgba::from_argb(argb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_argb() {
        assert_eq!(parse_argb("ff102030").unwrap(), Rgba::new(0x10, 0x20, 0x30, 0xff));
        assert_eq!(parse_argb("#80000000").unwrap(), Rgba::new(0, 0, 0, 0x80));
        assert_eq!(parse_argb("0x00ffffff").unwrap(), Rgba::new(255, 255, 255, 0));
        assert!(parse_argb("fff").is_err());
        assert!(parse_argb("gg000000").is_err());
    }

    #[test]
    fn test_tile_grid_covers_image_once() {
        let grid = tile_grid(600, 300, 256);
        assert_eq!(grid.len(), 6);
        assert!(grid[0].init);
        assert!(grid[1..].iter().all(|t| !t.init));

        let area: i64 = grid.iter().map(|t| t.width as i64 * t.height as i64).sum();
        assert_eq!(area, 600 * 300);
        assert_eq!(grid[5], TileRequest::new(512, 256, 88, 44));
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "tessel",
            "--max-width",
            "100",
            "--no-animation",
            "info",
            "a.png",
        ]);
        let config = load_config(&cli.decode).unwrap();
        assert_eq!(config.max_width, 100);
        assert_eq!(config.max_height, DecodeConfig::default().max_height);
        assert!(!config.decode_animation);
    }
}
