//! Print the axes of a monthly anomaly dataset and the regional mean of its
//! newest months. Useful for checking a new dataset id or a local copy before
//! pointing the pipeline at it.

use anyhow::{bail, Context, Result};
use clap::Parser;

use total_indicator::config::GridVariables;
use total_indicator::gateway::{MonthlyGrid, NetcdfGrid};
use total_indicator::indicator::mean_defined;
use total_indicator::region::RegionBounds;

#[derive(Parser, Debug)]
#[command(name = "inspect_grid", about = "Inspect a monthly SST anomaly dataset")]
struct Args {
    /// OPeNDAP URL or local NetCDF path
    location: String,

    /// Name of the anomaly variable
    #[arg(long, default_value = "sstAnom")]
    variable: String,

    /// Number of newest months to summarise
    #[arg(long, default_value_t = 3)]
    months: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let variables = GridVariables {
        anomaly: args.variable.clone(),
        ..GridVariables::default()
    };

    println!("Inspecting dataset: {}", args.location);
    let grid = NetcdfGrid::open(&args.location, &variables)
        .with_context(|| format!("opening {}", args.location))?;

    let months = grid.months();
    if months.is_empty() {
        bail!("{} has an empty time axis", args.location);
    }

    println!("\n=== AXES ===");
    println!(
        "  time      = {} months, {} .. {}",
        months.len(),
        months[0],
        months[months.len() - 1]
    );
    print_axis("latitude", grid.latitudes());
    print_axis("longitude", grid.longitudes());

    let region = RegionBounds::default();
    let window = region.window(grid.latitudes(), grid.longitudes())?;
    println!("\n=== REGION ===");
    println!(
        "  lat {:?} -> indices {}..={}",
        region.lat_range, window.lat.low, window.lat.high
    );
    println!(
        "  lon {:?} -> indices {}..={}",
        region.lon_range, window.lon.low, window.lon.high
    );

    println!("\n=== NEWEST MONTHS ===");
    let start = months.len().saturating_sub(args.months);
    for (index, month) in months.iter().enumerate().skip(start) {
        let field = grid.regional_field(index, &window)?;
        let defined = field.iter().filter(|v| v.is_finite()).count();
        match mean_defined(&field) {
            Some(mean) => println!(
                "  {}: mean anomaly {:.3} ({} of {} cells defined)",
                month,
                mean,
                defined,
                field.len()
            ),
            None => println!("  {}: no defined cells", month),
        }
    }

    Ok(())
}

fn print_axis(name: &str, values: &[f64]) {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) => {
            println!("  {:<9} = {} values, {} .. {}", name, values.len(), first, last)
        }
        _ => println!("  {:<9} = empty", name),
    }
}
