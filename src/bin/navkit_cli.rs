//! Thin CLI surface over the library: load geometry, bake, save. Owns no
//! algorithmic logic of its own.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use navkit::config::BakerConfig;
use navkit::math::Triangle;
use navkit::persistence;
use navkit::{bake, error::NavError};

#[derive(Parser)]
#[command(name = "navkit-cli", about = "Bake a navmesh from a text-format input into a binary-format output")]
struct Args {
    /// Text navmesh file to read as input geometry.
    input: String,
    /// Binary navmesh file to write the baked result to.
    output: String,
}

fn run(args: Args) -> Result<(), NavError> {
    let text = fs::read_to_string(&args.input).map_err(|e| NavError::FileFormatError(e.to_string()))?;
    let (vertices, polygons) = persistence::read_text(&text)?;

    let triangles: Vec<Triangle> = polygons
        .iter()
        .flat_map(|polygon| {
            (1..polygon.len().saturating_sub(1))
                .map(|i| Triangle::new(vertices[polygon[0] as usize], vertices[polygon[i] as usize], vertices[polygon[i + 1] as usize]))
                .collect::<Vec<_>>()
        })
        .collect();

    let navmesh = bake(&triangles, &BakerConfig::default())?;

    let mut out = Vec::new();
    persistence::write_binary(&mut out, navmesh.vertices(), &navmesh.polygons().iter().map(|p| p.vertices.clone()).collect::<Vec<_>>())?;
    fs::write(&args.output, out).map_err(|e| NavError::FileFormatError(e.to_string()))?;

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "bake failed");
            ExitCode::FAILURE
        }
    }
}
