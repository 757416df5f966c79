use clap::{Parser, Subcommand, ValueEnum};
use mf_results::JsonFormat;
use mf_sim::Simulator;

#[derive(Parser)]
#[command(name = "mf-cli")]
#[command(about = "dropletflow - droplet microfluidics network simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the built-in diamond demo network and print the result
    Demo {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::States)]
        format: Format,
        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
        /// Maximal adaptive time step in seconds (0 disables it)
        #[arg(long, default_value_t = 0.0)]
        adaptive_dt: f64,
        /// Print the droplet's channel path instead of the full result
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Full schema with chip, fluids, droplets and states
    States,
    /// Compact per-state network view
    Network,
}

impl From<Format> for JsonFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::States => JsonFormat::States,
            Format::Network => JsonFormat::Network,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            format,
            pretty,
            adaptive_dt,
            path,
        } => cmd_demo(format, pretty, adaptive_dt, path),
    }
}

/// Diamond network with one droplet: a flow-rate pump feeds a chain with
/// a parallel pair in the middle; ground and sink coincide at node -1.
fn cmd_demo(
    format: Format,
    pretty: bool,
    adaptive_dt: f64,
    path: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sim = Simulator::new();
    sim.set_name("diamond-demo");

    let flow_rate = 3e-11;
    sim.add_flow_rate_pump(-1, 0, flow_rate);

    let (width, height, length) = (100e-6, 30e-6, 1000e-6);
    let c1 = sim.add_channel(0, 1, height, width, length)?;
    sim.add_channel(1, 2, height, width, length)?;
    sim.add_channel(2, 3, height, width, length)?;
    sim.add_channel(2, 4, height, width, length)?;
    sim.add_channel(3, 4, height, width, length)?;
    sim.add_channel(4, -1, height, width, length)?;

    sim.add_sink(-1);
    sim.add_ground(-1);

    let continuous = sim.add_fluid(1e-3, 1e3, 0.0);
    let disperse = sim.add_fluid(3e-3, 1e3, 0.0);
    sim.set_continuous_phase(continuous)?;
    sim.set_maximal_adaptive_time_step(adaptive_dt);

    let droplet_volume = 1.5 * width * width * height;
    let droplet = sim.add_droplet(disperse, droplet_volume, 0.0, c1, 0.5)?;

    sim.check_chip_validity()?;
    let result = sim.simulate()?;

    eprintln!(
        "simulated {} states, {:.6} s of chip time",
        result.states.len(),
        result.states.last().map_or(0.0, |s| s.time)
    );

    let json = if path {
        let droplet_path = result.droplet_path(droplet);
        if pretty {
            serde_json::to_string_pretty(&droplet_path)?
        } else {
            serde_json::to_string(&droplet_path)?
        }
    } else if pretty {
        result.to_json_pretty(format.into())?
    } else {
        result.to_json(format.into())?
    };
    println!("{json}");
    Ok(())
}
